/// Persistence seam for the subscription service
///
/// The service only talks to storage through [`BillingStore`], so
/// reconciliation can run against Postgres ([`super::pg_store::PgBillingStore`])
/// or in memory ([`super::memory::InMemoryBillingStore`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::premium_plan::{PlanStatus, PlanType, PremiumPlan, UpsertPremiumPlan};
use crate::models::user::User;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// The billing-relevant slice of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingAccount {
    pub user_id: Uuid,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub is_premium: bool,
    pub premium_plan_type: Option<PlanType>,
    pub premium_expiry: Option<DateTime<Utc>>,
}

impl From<User> for BillingAccount {
    fn from(user: User) -> Self {
        Self {
            premium_plan_type: user.plan_type(),
            user_id: user.id,
            email: user.email,
            stripe_customer_id: user.stripe_customer_id,
            is_premium: user.is_premium,
            premium_expiry: user.premium_expiry,
        }
    }
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn account(&self, user_id: Uuid) -> Result<Option<BillingAccount>, StoreError>;

    async fn account_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<BillingAccount>, StoreError>;

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> Result<(), StoreError>;

    /// Writes `is_premium`, `premium_plan_type` and `premium_expiry` together
    async fn set_premium(
        &self,
        user_id: Uuid,
        is_premium: bool,
        plan_type: Option<PlanType>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn set_premium_expiry(
        &self,
        user_id: Uuid,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Upserts by `(user_id, stripe_subscription_id)`; None when the stored
    /// row has seen a newer event
    async fn upsert_subscription_plan(
        &self,
        plan: UpsertPremiumPlan,
    ) -> Result<Option<PremiumPlan>, StoreError>;

    /// Inserts once per checkout session, returning the existing row on repeats
    async fn insert_lifetime_plan(&self, plan: UpsertPremiumPlan)
        -> Result<PremiumPlan, StoreError>;

    async fn plan_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PremiumPlan>, StoreError>;

    async fn latest_plan(&self, user_id: Uuid) -> Result<Option<PremiumPlan>, StoreError>;

    /// Newest non-canceled plan backed by a Stripe subscription
    async fn current_subscription_plan(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PremiumPlan>, StoreError>;

    async fn update_plan_status(
        &self,
        plan_id: Uuid,
        status: PlanStatus,
        stripe_status: Option<&str>,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PremiumPlan>, StoreError>;

    async fn set_cancel_at_period_end(
        &self,
        plan_id: Uuid,
        cancel_at_period_end: bool,
    ) -> Result<(), StoreError>;

    async fn set_next_billing_date(
        &self,
        plan_id: Uuid,
        next_billing_date: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn has_other_active_plan(&self, user_id: Uuid, excluding: Uuid)
        -> Result<bool, StoreError>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, StoreError>;

    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<(), StoreError>;

    /// Marks the user's registered referrals converted; returns how many
    async fn convert_referrals(&self, user_id: Uuid) -> Result<u64, StoreError>;
}
