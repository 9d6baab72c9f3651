/// Postgres-backed [`BillingStore`]
///
/// Every operation is a single statement on the model layer, so concurrent
/// webhook deliveries never interleave partial writes to one row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::premium_plan::{PlanStatus, PlanType, PremiumPlan, UpsertPremiumPlan};
use crate::models::referral::Referral;
use crate::models::user::User;
use crate::models::webhook_event::StripeWebhookEvent;

use super::store::{BillingAccount, BillingStore, StoreError};

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn account(&self, user_id: Uuid) -> Result<Option<BillingAccount>, StoreError> {
        Ok(User::find_by_id(&self.pool, user_id).await?.map(Into::into))
    }

    async fn account_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<BillingAccount>, StoreError> {
        Ok(User::find_by_stripe_customer_id(&self.pool, customer_id)
            .await?
            .map(Into::into))
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> Result<(), StoreError> {
        User::set_stripe_customer_id(&self.pool, user_id, customer_id).await?;
        Ok(())
    }

    async fn set_premium(
        &self,
        user_id: Uuid,
        is_premium: bool,
        plan_type: Option<PlanType>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        User::set_premium(&self.pool, user_id, is_premium, plan_type, expiry).await?;
        Ok(())
    }

    async fn set_premium_expiry(
        &self,
        user_id: Uuid,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        User::set_premium_expiry(&self.pool, user_id, expiry).await?;
        Ok(())
    }

    async fn upsert_subscription_plan(
        &self,
        plan: UpsertPremiumPlan,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        Ok(PremiumPlan::upsert_subscription(&self.pool, plan).await?)
    }

    async fn insert_lifetime_plan(
        &self,
        plan: UpsertPremiumPlan,
    ) -> Result<PremiumPlan, StoreError> {
        Ok(PremiumPlan::insert_lifetime(&self.pool, plan).await?)
    }

    async fn plan_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        Ok(PremiumPlan::find_by_subscription_id(&self.pool, subscription_id).await?)
    }

    async fn latest_plan(&self, user_id: Uuid) -> Result<Option<PremiumPlan>, StoreError> {
        Ok(PremiumPlan::find_latest_for_user(&self.pool, user_id).await?)
    }

    async fn current_subscription_plan(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        Ok(PremiumPlan::find_current_subscription(&self.pool, user_id).await?)
    }

    async fn update_plan_status(
        &self,
        plan_id: Uuid,
        status: PlanStatus,
        stripe_status: Option<&str>,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        Ok(PremiumPlan::update_status(&self.pool, plan_id, status, stripe_status, event_at).await?)
    }

    async fn set_cancel_at_period_end(
        &self,
        plan_id: Uuid,
        cancel_at_period_end: bool,
    ) -> Result<(), StoreError> {
        PremiumPlan::set_cancel_at_period_end(&self.pool, plan_id, cancel_at_period_end).await?;
        Ok(())
    }

    async fn set_next_billing_date(
        &self,
        plan_id: Uuid,
        next_billing_date: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        PremiumPlan::set_next_billing_date(&self.pool, plan_id, next_billing_date).await?;
        Ok(())
    }

    async fn has_other_active_plan(
        &self,
        user_id: Uuid,
        excluding: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(PremiumPlan::has_other_active_plan(&self.pool, user_id, excluding).await?)
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(StripeWebhookEvent::exists(&self.pool, event_id).await?)
    }

    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<(), StoreError> {
        StripeWebhookEvent::record(&self.pool, event_id, event_type).await?;
        Ok(())
    }

    async fn convert_referrals(&self, user_id: Uuid) -> Result<u64, StoreError> {
        Ok(Referral::convert_for_user(&self.pool, user_id).await?.len() as u64)
    }
}
