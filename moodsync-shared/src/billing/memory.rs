/// In-memory [`BillingStore`]
///
/// Mirrors the conflict and ordering rules of the Postgres statements so the
/// subscription service can be exercised without a database.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::premium_plan::{
    BillingInterval, PlanStatus, PlanType, PremiumPlan, UpsertPremiumPlan,
};

use super::store::{BillingAccount, BillingStore, StoreError};

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, BillingAccount>,
    plans: Vec<PremiumPlan>,
    events: HashSet<String>,
    registered_referrals: HashMap<Uuid, u64>,
    converted_referrals: HashMap<Uuid, u64>,
    referral_failure: Option<String>,
}

#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a free account and returns its id
    pub fn insert_account(&self, email: &str, stripe_customer_id: Option<&str>) -> Uuid {
        let user_id = Uuid::new_v4();
        self.state().accounts.insert(
            user_id,
            BillingAccount {
                user_id,
                email: email.to_string(),
                stripe_customer_id: stripe_customer_id.map(str::to_string),
                is_premium: false,
                premium_plan_type: None,
                premium_expiry: None,
            },
        );
        user_id
    }

    pub fn account_snapshot(&self, user_id: Uuid) -> Option<BillingAccount> {
        self.state().accounts.get(&user_id).cloned()
    }

    pub fn plans_for(&self, user_id: Uuid) -> Vec<PremiumPlan> {
        self.state()
            .plans
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Records a registered referral that brought `user_id` in
    pub fn add_registered_referral(&self, user_id: Uuid) {
        *self.state().registered_referrals.entry(user_id).or_default() += 1;
    }

    pub fn converted_referrals(&self, user_id: Uuid) -> u64 {
        self.state()
            .converted_referrals
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Makes every later referral conversion fail with `message`
    pub fn fail_referral_conversion(&self, message: &str) {
        self.state().referral_failure = Some(message.to_string());
    }

    pub fn processed_event_count(&self) -> usize {
        self.state().events.len()
    }
}

fn new_plan(data: UpsertPremiumPlan, now: DateTime<Utc>) -> PremiumPlan {
    let card = data.card;
    PremiumPlan {
        id: Uuid::new_v4(),
        user_id: data.user_id,
        plan_type: data.plan_type.as_str().to_string(),
        billing_interval: data.billing_interval.as_str().to_string(),
        status: data.status.as_str().to_string(),
        stripe_subscription_id: data.stripe_subscription_id,
        stripe_subscription_status: data.stripe_subscription_status,
        stripe_price_id: data.stripe_price_id,
        stripe_checkout_session_id: data.stripe_checkout_session_id,
        is_trial: data.is_trial,
        is_lifetime: data.is_lifetime,
        cancel_at_period_end: data.cancel_at_period_end,
        current_period_start: data.current_period_start,
        current_period_end: data.current_period_end,
        next_billing_date: None,
        trial_ends_at: data.trial_ends_at,
        canceled_at: data.canceled_at,
        card_brand: card.as_ref().map(|c| c.brand.clone()),
        card_last4: card.as_ref().map(|c| c.last4.clone()),
        card_exp_month: card.as_ref().map(|c| c.exp_month),
        card_exp_year: card.as_ref().map(|c| c.exp_year),
        max_family_members: data.plan_type.max_family_members(),
        last_event_at: data.last_event_at,
        created_at: now,
        updated_at: now,
    }
}

fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Newest plan matching `pred`, by `updated_at`
fn newest<F>(plans: &[PremiumPlan], pred: F) -> Option<&PremiumPlan>
where
    F: Fn(&PremiumPlan) -> bool,
{
    plans
        .iter()
        .filter(|p| pred(p))
        .max_by_key(|p| (p.updated_at, p.created_at))
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn account(&self, user_id: Uuid) -> Result<Option<BillingAccount>, StoreError> {
        Ok(self.state().accounts.get(&user_id).cloned())
    }

    async fn account_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<BillingAccount>, StoreError> {
        Ok(self
            .state()
            .accounts
            .values()
            .find(|a| a.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Other(format!("unknown user {}", user_id)))?;
        account.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }

    async fn set_premium(
        &self,
        user_id: Uuid,
        is_premium: bool,
        plan_type: Option<PlanType>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        if let Some(account) = self.state().accounts.get_mut(&user_id) {
            account.is_premium = is_premium;
            account.premium_plan_type = plan_type;
            account.premium_expiry = expiry;
        }
        Ok(())
    }

    async fn set_premium_expiry(
        &self,
        user_id: Uuid,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        if let Some(account) = self.state().accounts.get_mut(&user_id) {
            account.premium_expiry = expiry;
        }
        Ok(())
    }

    async fn upsert_subscription_plan(
        &self,
        data: UpsertPremiumPlan,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        let now = Utc::now();
        let mut state = self.state();

        let existing = state.plans.iter().position(|p| {
            p.user_id == data.user_id
                && p.stripe_subscription_id.is_some()
                && p.stripe_subscription_id == data.stripe_subscription_id
        });

        let Some(index) = existing else {
            let plan = new_plan(data, now);
            state.plans.push(plan.clone());
            return Ok(Some(plan));
        };
        let plan = &mut state.plans[index];

        if let (Some(stored), Some(incoming)) = (plan.last_event_at, data.last_event_at) {
            if stored > incoming {
                return Ok(None);
            }
        }

        plan.plan_type = data.plan_type.as_str().to_string();
        plan.billing_interval = data.billing_interval.as_str().to_string();
        plan.status = data.status.as_str().to_string();
        plan.stripe_subscription_status = data.stripe_subscription_status;
        plan.stripe_price_id = data.stripe_price_id.or(plan.stripe_price_id.take());
        if plan.stripe_checkout_session_id.is_none() {
            plan.stripe_checkout_session_id = data.stripe_checkout_session_id;
        }
        plan.is_trial = data.is_trial;
        plan.cancel_at_period_end = data.cancel_at_period_end;
        plan.current_period_start = data.current_period_start;
        plan.current_period_end = data.current_period_end;
        plan.trial_ends_at = data.trial_ends_at;
        plan.canceled_at = data.canceled_at.or(plan.canceled_at);
        if let Some(card) = data.card {
            plan.card_brand = Some(card.brand);
            plan.card_last4 = Some(card.last4);
            plan.card_exp_month = Some(card.exp_month);
            plan.card_exp_year = Some(card.exp_year);
        }
        plan.max_family_members = data.plan_type.max_family_members();
        plan.last_event_at = later(plan.last_event_at, data.last_event_at);
        plan.updated_at = now;

        Ok(Some(plan.clone()))
    }

    async fn insert_lifetime_plan(
        &self,
        mut data: UpsertPremiumPlan,
    ) -> Result<PremiumPlan, StoreError> {
        let mut state = self.state();

        if let Some(existing) = state.plans.iter().find(|p| {
            p.stripe_checkout_session_id.is_some()
                && p.stripe_checkout_session_id == data.stripe_checkout_session_id
        }) {
            return Ok(existing.clone());
        }

        data.billing_interval = BillingInterval::Lifetime;
        data.status = PlanStatus::Active;
        data.stripe_subscription_id = None;
        data.stripe_subscription_status = None;
        data.is_trial = false;
        data.is_lifetime = true;
        data.cancel_at_period_end = false;
        data.card = None;

        let plan = new_plan(data, Utc::now());
        state.plans.push(plan.clone());
        Ok(plan)
    }

    async fn plan_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        let state = self.state();
        Ok(newest(&state.plans, |p| {
            p.stripe_subscription_id.as_deref() == Some(subscription_id)
        })
        .cloned())
    }

    async fn latest_plan(&self, user_id: Uuid) -> Result<Option<PremiumPlan>, StoreError> {
        let state = self.state();
        Ok(newest(&state.plans, |p| p.user_id == user_id).cloned())
    }

    async fn current_subscription_plan(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        let state = self.state();
        Ok(newest(&state.plans, |p| {
            p.user_id == user_id
                && p.stripe_subscription_id.is_some()
                && p.plan_status() != Some(PlanStatus::Canceled)
        })
        .cloned())
    }

    async fn update_plan_status(
        &self,
        plan_id: Uuid,
        status: PlanStatus,
        stripe_status: Option<&str>,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PremiumPlan>, StoreError> {
        let now = Utc::now();
        let mut state = self.state();
        let Some(plan) = state.plans.iter_mut().find(|p| p.id == plan_id) else {
            return Ok(None);
        };

        plan.status = status.as_str().to_string();
        if let Some(stripe_status) = stripe_status {
            plan.stripe_subscription_status = Some(stripe_status.to_string());
        }
        if status == PlanStatus::Canceled && plan.canceled_at.is_none() {
            plan.canceled_at = Some(now);
        }
        plan.last_event_at = later(plan.last_event_at, event_at);
        plan.updated_at = now;

        Ok(Some(plan.clone()))
    }

    async fn set_cancel_at_period_end(
        &self,
        plan_id: Uuid,
        cancel_at_period_end: bool,
    ) -> Result<(), StoreError> {
        if let Some(plan) = self.state().plans.iter_mut().find(|p| p.id == plan_id) {
            plan.cancel_at_period_end = cancel_at_period_end;
            plan.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_next_billing_date(
        &self,
        plan_id: Uuid,
        next_billing_date: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        if let Some(plan) = self.state().plans.iter_mut().find(|p| p.id == plan_id) {
            plan.next_billing_date = next_billing_date;
            plan.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn has_other_active_plan(
        &self,
        user_id: Uuid,
        excluding: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .plans
            .iter()
            .any(|p| p.user_id == user_id && p.id != excluding && p.grants_premium()))
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self.state().events.contains(event_id))
    }

    async fn record_event(&self, event_id: &str, _event_type: &str) -> Result<(), StoreError> {
        self.state().events.insert(event_id.to_string());
        Ok(())
    }

    async fn convert_referrals(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state();
        if let Some(message) = &state.referral_failure {
            return Err(StoreError::Other(message.clone()));
        }
        let converted = state.registered_referrals.remove(&user_id).unwrap_or(0);
        *state.converted_referrals.entry(user_id).or_default() += converted;
        Ok(converted)
    }
}
