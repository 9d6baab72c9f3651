/// Premium plan model and database operations
///
/// A user owns any number of plans over time. Subscription plans are keyed
/// by `(user_id, stripe_subscription_id)` and upserted on every relevant
/// webhook; lifetime purchases are keyed by their checkout session id. Plans
/// are retired by status and never deleted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE premium_plans (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     plan_type VARCHAR(20) NOT NULL,
///     billing_interval VARCHAR(20) NOT NULL,
///     status VARCHAR(30) NOT NULL,
///     stripe_subscription_id VARCHAR(255),
///     stripe_subscription_status VARCHAR(30),
///     stripe_price_id VARCHAR(255),
///     stripe_checkout_session_id VARCHAR(255) UNIQUE,
///     is_trial BOOLEAN NOT NULL DEFAULT FALSE,
///     is_lifetime BOOLEAN NOT NULL DEFAULT FALSE,
///     cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
///     current_period_start TIMESTAMPTZ,
///     current_period_end TIMESTAMPTZ,
///     next_billing_date TIMESTAMPTZ,
///     trial_ends_at TIMESTAMPTZ,
///     canceled_at TIMESTAMPTZ,
///     card_brand VARCHAR(30),
///     card_last4 VARCHAR(4),
///     card_exp_month INTEGER,
///     card_exp_year INTEGER,
///     max_family_members INTEGER NOT NULL DEFAULT 1,
///     last_event_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (user_id, stripe_subscription_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const PLAN_COLUMNS: &str = "id, user_id, plan_type, billing_interval, status, \
     stripe_subscription_id, stripe_subscription_status, stripe_price_id, \
     stripe_checkout_session_id, is_trial, is_lifetime, cancel_at_period_end, \
     current_period_start, current_period_end, next_billing_date, trial_ends_at, \
     canceled_at, card_brand, card_last4, card_exp_month, card_exp_year, \
     max_family_members, last_event_at, created_at, updated_at";

/// Family plans cover the owner plus this many members
pub const FAMILY_PLAN_MAX_MEMBERS: i32 = 5;

/// Premium plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Individual,
    Family,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Individual => "individual",
            PlanType::Family => "family",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(PlanType::Individual),
            "family" => Some(PlanType::Family),
            _ => None,
        }
    }

    /// Number of accounts the plan may cover besides the owner
    pub fn max_family_members(&self) -> i32 {
        match self {
            PlanType::Individual => 1,
            PlanType::Family => FAMILY_PLAN_MAX_MEMBERS,
        }
    }
}

/// How often a plan is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
    /// One-off payment, never renews
    Lifetime,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
            BillingInterval::Lifetime => "lifetime",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingInterval::Monthly),
            "yearly" => Some(BillingInterval::Yearly),
            "lifetime" => Some(BillingInterval::Lifetime),
            _ => None,
        }
    }

    /// Maps a Stripe recurring interval (`month`, `year`) onto ours
    pub fn from_stripe_interval(s: &str) -> Option<Self> {
        match s {
            "month" => Some(BillingInterval::Monthly),
            "year" => Some(BillingInterval::Yearly),
            _ => None,
        }
    }
}

/// Local plan status
///
/// Mirrors the Stripe subscription status, folding `incomplete_expired`
/// into `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Incomplete,
    Paused,
    Canceled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Trialing => "trialing",
            PlanStatus::PastDue => "past_due",
            PlanStatus::Unpaid => "unpaid",
            PlanStatus::Incomplete => "incomplete",
            PlanStatus::Paused => "paused",
            PlanStatus::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PlanStatus::Active),
            "trialing" => Some(PlanStatus::Trialing),
            "past_due" => Some(PlanStatus::PastDue),
            "unpaid" => Some(PlanStatus::Unpaid),
            "incomplete" => Some(PlanStatus::Incomplete),
            "paused" => Some(PlanStatus::Paused),
            "canceled" => Some(PlanStatus::Canceled),
            _ => None,
        }
    }

    /// Only active and trialing plans grant premium access
    pub fn grants_premium(&self) -> bool {
        matches!(self, PlanStatus::Active | PlanStatus::Trialing)
    }
}

/// Card shown on the billing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub brand: String,
    pub last4: String,
    pub exp_month: i32,
    pub exp_year: i32,
}

/// Premium plan row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PremiumPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_type: String,
    pub billing_interval: String,
    pub status: String,
    pub stripe_subscription_id: Option<String>,
    pub stripe_subscription_status: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_checkout_session_id: Option<String>,
    pub is_trial: bool,
    pub is_lifetime: bool,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    pub max_family_members: i32,

    /// `created` timestamp of the newest Stripe event applied to this row
    pub last_event_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PremiumPlan {
    pub fn plan_status(&self) -> Option<PlanStatus> {
        PlanStatus::from_str(&self.status)
    }

    pub fn plan_type(&self) -> Option<PlanType> {
        PlanType::from_str(&self.plan_type)
    }

    pub fn interval(&self) -> Option<BillingInterval> {
        BillingInterval::from_str(&self.billing_interval)
    }

    /// Whether this plan currently grants premium access
    pub fn grants_premium(&self) -> bool {
        self.is_lifetime || self.plan_status().is_some_and(|s| s.grants_premium())
    }

    /// True when an event created at `event_at` predates what was already applied
    pub fn is_stale_event(&self, event_at: DateTime<Utc>) -> bool {
        self.last_event_at.is_some_and(|last| event_at < last)
    }

    pub fn card(&self) -> Option<CardDetails> {
        Some(CardDetails {
            brand: self.card_brand.clone()?,
            last4: self.card_last4.clone()?,
            exp_month: self.card_exp_month?,
            exp_year: self.card_exp_year?,
        })
    }
}

/// Input for inserting or updating a plan
#[derive(Debug, Clone)]
pub struct UpsertPremiumPlan {
    pub user_id: Uuid,
    pub plan_type: PlanType,
    pub billing_interval: BillingInterval,
    pub status: PlanStatus,
    pub stripe_subscription_id: Option<String>,
    pub stripe_subscription_status: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_checkout_session_id: Option<String>,
    pub is_trial: bool,
    pub is_lifetime: bool,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,

    /// None keeps whatever card is already stored
    pub card: Option<CardDetails>,

    pub last_event_at: Option<DateTime<Utc>>,
}

impl PremiumPlan {
    /// Inserts or updates the plan for `(user_id, stripe_subscription_id)`
    ///
    /// The update is skipped when the stored `last_event_at` is newer than the
    /// incoming one, in which case None is returned. A missing card or
    /// checkout session id keeps the stored value.
    pub async fn upsert_subscription(
        pool: &PgPool,
        data: UpsertPremiumPlan,
    ) -> Result<Option<Self>, sqlx::Error> {
        let card = data.card;
        let query = format!(
            r#"
            INSERT INTO premium_plans (
                user_id, plan_type, billing_interval, status,
                stripe_subscription_id, stripe_subscription_status, stripe_price_id,
                stripe_checkout_session_id, is_trial, is_lifetime, cancel_at_period_end,
                current_period_start, current_period_end, trial_ends_at, canceled_at,
                card_brand, card_last4, card_exp_month, card_exp_year,
                max_family_members, last_event_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21)
            ON CONFLICT (user_id, stripe_subscription_id) DO UPDATE SET
                plan_type = EXCLUDED.plan_type,
                billing_interval = EXCLUDED.billing_interval,
                status = EXCLUDED.status,
                stripe_subscription_status = EXCLUDED.stripe_subscription_status,
                stripe_price_id = COALESCE(EXCLUDED.stripe_price_id, premium_plans.stripe_price_id),
                stripe_checkout_session_id = COALESCE(premium_plans.stripe_checkout_session_id, EXCLUDED.stripe_checkout_session_id),
                is_trial = EXCLUDED.is_trial,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                trial_ends_at = EXCLUDED.trial_ends_at,
                canceled_at = COALESCE(EXCLUDED.canceled_at, premium_plans.canceled_at),
                card_brand = COALESCE(EXCLUDED.card_brand, premium_plans.card_brand),
                card_last4 = COALESCE(EXCLUDED.card_last4, premium_plans.card_last4),
                card_exp_month = COALESCE(EXCLUDED.card_exp_month, premium_plans.card_exp_month),
                card_exp_year = COALESCE(EXCLUDED.card_exp_year, premium_plans.card_exp_year),
                max_family_members = EXCLUDED.max_family_members,
                last_event_at = GREATEST(EXCLUDED.last_event_at, premium_plans.last_event_at),
                updated_at = NOW()
            WHERE premium_plans.last_event_at IS NULL
               OR EXCLUDED.last_event_at IS NULL
               OR premium_plans.last_event_at <= EXCLUDED.last_event_at
            RETURNING {PLAN_COLUMNS}
            "#
        );

        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(data.user_id)
            .bind(data.plan_type.as_str())
            .bind(data.billing_interval.as_str())
            .bind(data.status.as_str())
            .bind(data.stripe_subscription_id)
            .bind(data.stripe_subscription_status)
            .bind(data.stripe_price_id)
            .bind(data.stripe_checkout_session_id)
            .bind(data.is_trial)
            .bind(data.is_lifetime)
            .bind(data.cancel_at_period_end)
            .bind(data.current_period_start)
            .bind(data.current_period_end)
            .bind(data.trial_ends_at)
            .bind(data.canceled_at)
            .bind(card.as_ref().map(|c| c.brand.clone()))
            .bind(card.as_ref().map(|c| c.last4.clone()))
            .bind(card.as_ref().map(|c| c.exp_month))
            .bind(card.as_ref().map(|c| c.exp_year))
            .bind(data.plan_type.max_family_members())
            .bind(data.last_event_at)
            .fetch_optional(pool)
            .await
    }

    /// Inserts a lifetime plan once per checkout session
    ///
    /// A redelivered checkout returns the existing row unchanged.
    pub async fn insert_lifetime(
        pool: &PgPool,
        data: UpsertPremiumPlan,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO premium_plans (
                user_id, plan_type, billing_interval, status, stripe_price_id,
                stripe_checkout_session_id, is_trial, is_lifetime, cancel_at_period_end,
                current_period_start, current_period_end, max_family_members, last_event_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, TRUE, FALSE, $7, $8, $9, $10)
            ON CONFLICT (stripe_checkout_session_id) DO NOTHING
            RETURNING {PLAN_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(data.user_id)
            .bind(data.plan_type.as_str())
            .bind(BillingInterval::Lifetime.as_str())
            .bind(PlanStatus::Active.as_str())
            .bind(&data.stripe_price_id)
            .bind(&data.stripe_checkout_session_id)
            .bind(data.current_period_start)
            .bind(data.current_period_end)
            .bind(data.plan_type.max_family_members())
            .bind(data.last_event_at)
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(plan) => Ok(plan),
            None => {
                let query = format!(
                    "SELECT {PLAN_COLUMNS} FROM premium_plans WHERE stripe_checkout_session_id = $1"
                );
                sqlx::query_as::<_, PremiumPlan>(&query)
                    .bind(&data.stripe_checkout_session_id)
                    .fetch_one(pool)
                    .await
            }
        }
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {PLAN_COLUMNS} FROM premium_plans WHERE id = $1");
        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds the plan tracking a Stripe subscription
    pub async fn find_by_subscription_id(
        pool: &PgPool,
        subscription_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM premium_plans WHERE stripe_subscription_id = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(subscription_id)
            .fetch_optional(pool)
            .await
    }

    /// Most recently touched plan for a user
    pub async fn find_latest_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM premium_plans WHERE user_id = $1 \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Newest non-canceled plan backed by a Stripe subscription
    pub async fn find_current_subscription(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM premium_plans \
             WHERE user_id = $1 AND stripe_subscription_id IS NOT NULL AND status <> 'canceled' \
             ORDER BY updated_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM premium_plans WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Sets the local and Stripe status of a plan
    ///
    /// `canceled` also stamps `canceled_at` if it is not set yet.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: PlanStatus,
        stripe_status: Option<&str>,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE premium_plans
            SET status = $2,
                stripe_subscription_status = COALESCE($3, stripe_subscription_status),
                canceled_at = CASE WHEN $2 = 'canceled' THEN COALESCE(canceled_at, NOW()) ELSE canceled_at END,
                last_event_at = GREATEST($4, last_event_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PremiumPlan>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(stripe_status)
            .bind(event_at)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_cancel_at_period_end(
        pool: &PgPool,
        id: Uuid,
        cancel_at_period_end: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE premium_plans SET cancel_at_period_end = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(cancel_at_period_end)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_next_billing_date(
        pool: &PgPool,
        id: Uuid,
        next_billing_date: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE premium_plans SET next_billing_date = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(next_billing_date)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether the user holds a premium-granting plan other than `excluding`
    pub async fn has_other_active_plan(
        pool: &PgPool,
        user_id: Uuid,
        excluding: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM premium_plans
                WHERE user_id = $1 AND id <> $2
                  AND (is_lifetime = TRUE OR status IN ('active', 'trialing'))
            )
            "#,
        )
        .bind(user_id)
        .bind(excluding)
        .fetch_one(pool)
        .await
    }

    /// Retires plans scheduled to cancel whose period has ended
    ///
    /// Returns the affected user ids.
    pub async fn cancel_ended_periods(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE premium_plans
            SET status = 'canceled', canceled_at = COALESCE(canceled_at, $1), updated_at = NOW()
            WHERE cancel_at_period_end = TRUE
              AND status <> 'canceled'
              AND is_lifetime = FALSE
              AND current_period_end IS NOT NULL
              AND current_period_end <= $1
            RETURNING user_id
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn plan(status: &str, is_lifetime: bool) -> PremiumPlan {
        let now = Utc::now();
        PremiumPlan {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_type: "individual".to_string(),
            billing_interval: "monthly".to_string(),
            status: status.to_string(),
            stripe_subscription_id: Some("sub_1".to_string()),
            stripe_subscription_status: Some(status.to_string()),
            stripe_price_id: None,
            stripe_checkout_session_id: None,
            is_trial: false,
            is_lifetime,
            cancel_at_period_end: false,
            current_period_start: None,
            current_period_end: None,
            next_billing_date: None,
            trial_ends_at: None,
            canceled_at: None,
            card_brand: None,
            card_last4: None,
            card_exp_month: None,
            card_exp_year: None,
            max_family_members: 1,
            last_event_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PlanStatus::Active,
            PlanStatus::Trialing,
            PlanStatus::PastDue,
            PlanStatus::Unpaid,
            PlanStatus::Incomplete,
            PlanStatus::Paused,
            PlanStatus::Canceled,
        ] {
            assert_eq!(PlanStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PlanStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_only_active_and_trialing_grant_premium() {
        assert!(PlanStatus::Active.grants_premium());
        assert!(PlanStatus::Trialing.grants_premium());
        assert!(!PlanStatus::PastDue.grants_premium());
        assert!(!PlanStatus::Unpaid.grants_premium());
        assert!(!PlanStatus::Incomplete.grants_premium());
        assert!(!PlanStatus::Paused.grants_premium());
        assert!(!PlanStatus::Canceled.grants_premium());
    }

    #[test]
    fn test_lifetime_plan_always_grants_premium() {
        assert!(plan("canceled", true).grants_premium());
        assert!(!plan("canceled", false).grants_premium());
    }

    #[test]
    fn test_stale_event_detection() {
        let p = plan("active", false);
        let last = p.last_event_at.unwrap();
        assert!(p.is_stale_event(last - Duration::seconds(1)));
        assert!(!p.is_stale_event(last));
        assert!(!p.is_stale_event(last + Duration::seconds(1)));
    }

    #[test]
    fn test_stripe_interval_mapping() {
        assert_eq!(BillingInterval::from_stripe_interval("month"), Some(BillingInterval::Monthly));
        assert_eq!(BillingInterval::from_stripe_interval("year"), Some(BillingInterval::Yearly));
        assert_eq!(BillingInterval::from_stripe_interval("week"), None);
    }

    #[test]
    fn test_card_requires_all_fields() {
        let mut p = plan("active", false);
        assert!(p.card().is_none());
        p.card_brand = Some("visa".to_string());
        p.card_last4 = Some("4242".to_string());
        p.card_exp_month = Some(12);
        p.card_exp_year = Some(2030);
        assert_eq!(p.card().unwrap().last4, "4242");
    }
}
