/// Referral model and database operations
///
/// # Lifecycle
///
/// ```text
/// pending ──(referred user signs up)──> registered ──(first purchase)──> converted
///    │                                      │
///    └──────────(30 days pass)──────────────┴──> expired
/// ```
///
/// Every [`REFERRALS_PER_BOUNTY`] conversions earn the referrer one bounty.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE referrals (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     referrer_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     referred_email CITEXT NOT NULL,
///     referred_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     status VARCHAR(20) NOT NULL DEFAULT 'pending',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     registered_at TIMESTAMPTZ,
///     converted_at TIMESTAMPTZ,
///     expires_at TIMESTAMPTZ NOT NULL,
///     UNIQUE (referrer_id, referred_email)
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const REFERRAL_COLUMNS: &str = "id, referrer_id, referred_email, referred_user_id, status, \
     created_at, registered_at, converted_at, expires_at";

/// Days an unconverted referral stays open
pub const REFERRAL_EXPIRY_DAYS: i64 = 30;

/// Conversions needed per bounty
pub const REFERRALS_PER_BOUNTY: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Registered,
    Converted,
    Expired,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Registered => "registered",
            ReferralStatus::Converted => "converted",
            ReferralStatus::Expired => "expired",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReferralStatus::Pending),
            "registered" => Some(ReferralStatus::Registered),
            "converted" => Some(ReferralStatus::Converted),
            "expired" => Some(ReferralStatus::Expired),
            _ => None,
        }
    }

    /// Whether the referral can still move forward
    pub fn is_open(&self) -> bool {
        matches!(self, ReferralStatus::Pending | ReferralStatus::Registered)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_email: String,
    pub referred_user_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl Referral {
    pub fn referral_status(&self) -> Option<ReferralStatus> {
        ReferralStatus::from_str(&self.status)
    }
}

/// Aggregated referral counts for a referrer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub total: i64,
    pub pending: i64,
    pub registered: i64,
    pub converted: i64,
    pub expired: i64,
    pub bounties_earned: i64,

    /// Conversions counted toward the next bounty
    pub progress_to_next_bounty: i64,

    pub conversions_per_bounty: i64,
}

impl ReferralStats {
    /// Builds stats from `(status, count)` pairs
    pub fn from_counts<'a>(counts: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let mut stats = ReferralStats {
            conversions_per_bounty: REFERRALS_PER_BOUNTY,
            ..Default::default()
        };

        for (status, count) in counts {
            match ReferralStatus::from_str(status) {
                Some(ReferralStatus::Pending) => stats.pending += count,
                Some(ReferralStatus::Registered) => stats.registered += count,
                Some(ReferralStatus::Converted) => stats.converted += count,
                Some(ReferralStatus::Expired) => stats.expired += count,
                None => continue,
            }
            stats.total += count;
        }

        stats.bounties_earned = stats.converted / REFERRALS_PER_BOUNTY;
        stats.progress_to_next_bounty = stats.converted % REFERRALS_PER_BOUNTY;
        stats
    }
}

impl Referral {
    /// Creates a pending referral that expires in [`REFERRAL_EXPIRY_DAYS`]
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if the referrer already invited this email.
    pub async fn create(
        pool: &PgPool,
        referrer_id: Uuid,
        referred_email: &str,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO referrals (referrer_id, referred_email, status, expires_at)
            VALUES ($1, $2, 'pending', $3)
            RETURNING {REFERRAL_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Referral>(&query)
            .bind(referrer_id)
            .bind(referred_email)
            .bind(Utc::now() + Duration::days(REFERRAL_EXPIRY_DAYS))
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_referrer(
        pool: &PgPool,
        referrer_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE referrer_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Referral>(&query)
            .bind(referrer_id)
            .fetch_all(pool)
            .await
    }

    /// Links a newly registered user to a referrer
    ///
    /// Promotes an existing pending invite for the email or creates a new
    /// registered referral. Returns None if the invite already moved past
    /// pending.
    pub async fn register(
        pool: &PgPool,
        referrer_id: Uuid,
        referred_email: &str,
        referred_user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO referrals (
                referrer_id, referred_email, referred_user_id, status, registered_at, expires_at
            )
            VALUES ($1, $2, $3, 'registered', NOW(), $4)
            ON CONFLICT (referrer_id, referred_email) DO UPDATE SET
                referred_user_id = EXCLUDED.referred_user_id,
                status = 'registered',
                registered_at = NOW()
            WHERE referrals.status = 'pending'
            RETURNING {REFERRAL_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Referral>(&query)
            .bind(referrer_id)
            .bind(referred_email)
            .bind(referred_user_id)
            .bind(Utc::now() + Duration::days(REFERRAL_EXPIRY_DAYS))
            .fetch_optional(pool)
            .await
    }

    /// Marks the registered referral of a buyer as converted
    ///
    /// Returns the converted rows (empty if the user was not referred).
    pub async fn convert_for_user(
        pool: &PgPool,
        referred_user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE referrals
            SET status = 'converted', converted_at = NOW()
            WHERE referred_user_id = $1 AND status = 'registered'
            RETURNING {REFERRAL_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Referral>(&query)
            .bind(referred_user_id)
            .fetch_all(pool)
            .await
    }

    /// Expires open referrals past their deadline
    pub async fn expire_stale(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE referrals
            SET status = 'expired'
            WHERE status IN ('pending', 'registered') AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn stats(pool: &PgPool, referrer_id: Uuid) -> Result<ReferralStats, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM referrals WHERE referrer_id = $1 GROUP BY status",
        )
        .bind(referrer_id)
        .fetch_all(pool)
        .await?;

        Ok(ReferralStats::from_counts(
            rows.iter().map(|(status, count)| (status.as_str(), *count)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_statuses() {
        assert!(ReferralStatus::Pending.is_open());
        assert!(ReferralStatus::Registered.is_open());
        assert!(!ReferralStatus::Converted.is_open());
        assert!(!ReferralStatus::Expired.is_open());
    }

    #[test]
    fn test_stats_bounties() {
        let stats = ReferralStats::from_counts([
            ("pending", 2),
            ("registered", 1),
            ("converted", 12),
            ("expired", 3),
        ]);

        assert_eq!(stats.total, 18);
        assert_eq!(stats.converted, 12);
        assert_eq!(stats.bounties_earned, 2);
        assert_eq!(stats.progress_to_next_bounty, 2);
        assert_eq!(stats.conversions_per_bounty, REFERRALS_PER_BOUNTY);
    }

    #[test]
    fn test_stats_empty() {
        let stats = ReferralStats::from_counts(std::iter::empty());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.bounties_earned, 0);
        assert_eq!(stats.progress_to_next_bounty, 0);
    }

    #[test]
    fn test_stats_ignore_unknown_status() {
        let stats = ReferralStats::from_counts([("converted", 5), ("weird", 4)]);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.bounties_earned, 1);
        assert_eq!(stats.progress_to_next_bounty, 0);
    }
}
