/// Subscription service
///
/// Keeps each user's premium plans and `is_premium` flag in line with
/// Stripe. Webhook deliveries are verified, de-duplicated by event id and
/// applied through [`BillingStore`]; outgoing calls go through
/// [`PaymentGateway`].
///
/// # Reconciliation rules
///
/// - A user is premium while one of their plans is `active`, `trialing` or
///   lifetime.
/// - Subscription plans are upserted by `(user_id, stripe_subscription_id)`,
///   so redelivered events never create a second row.
/// - Every plan remembers the `created` time of the newest event applied to
///   it. Older events are acknowledged as stale and not applied.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::premium_plan::{
    BillingInterval, PlanStatus, PlanType, PremiumPlan, UpsertPremiumPlan,
};

use super::config::{PriceConfig, StripeConfig};
use super::gateway::{CheckoutRequest, GatewayError, PaymentGateway};
use super::signature::{verify_signature, SignatureError};
use super::store::{BillingStore, StoreError};
use super::types::{
    CheckoutMode, CheckoutSession, Invoice, StripeEvent, StripeSubscription, SubscriptionStatus,
};

/// Lifetime purchases are recorded as expiring 99 years out
pub const LIFETIME_DAYS: i64 = 365 * 99;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("No Stripe price configured for {plan_type} {interval} plans")]
    PriceNotConfigured {
        plan_type: &'static str,
        interval: &'static str,
    },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("User has no active subscription")]
    NoActiveSubscription,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Missing {0} on Stripe object")]
    MissingMetadata(&'static str),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to a verified webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Applied to local state
    Processed,
    /// Event id was already processed
    Duplicate,
    /// Older than what the plan already reflects
    Stale,
    /// Event type or object not relevant to billing
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Stale => "stale",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLink {
    pub session_id: String,
    pub url: Option<String>,
}

/// Premium flags of a user with their most recent plan
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub is_premium: bool,
    pub premium_plan_type: Option<PlanType>,
    pub premium_expiry: Option<DateTime<Utc>>,
    pub plan: Option<PremiumPlan>,
}

pub struct SubscriptionService {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    prices: PriceConfig,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: &StripeConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            prices: config.prices.clone(),
            webhook_secret: config.webhook_secret.clone(),
            tolerance_secs: config.webhook_tolerance_secs,
        }
    }

    /// Returns the user's Stripe customer id, creating the customer on first use
    pub async fn create_customer(&self, user_id: Uuid) -> Result<String, BillingError> {
        let account = self
            .store
            .account(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;

        if let Some(customer_id) = account.stripe_customer_id {
            return Ok(customer_id);
        }

        let customer_id = self.gateway.create_customer(&account.email, user_id).await?;
        self.store.set_customer_id(user_id, &customer_id).await?;

        info!(%user_id, %customer_id, "Created Stripe customer");
        Ok(customer_id)
    }

    /// Starts a hosted checkout for a plan
    ///
    /// Lifetime plans are sold as one-off payments, everything else as
    /// subscriptions.
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        plan_type: PlanType,
        interval: BillingInterval,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutLink, BillingError> {
        let price_id = self
            .prices
            .price_for(plan_type, interval)
            .ok_or(BillingError::PriceNotConfigured {
                plan_type: plan_type.as_str(),
                interval: interval.as_str(),
            })?
            .to_string();

        let customer_id = self.create_customer(user_id).await?;

        let mode = match interval {
            BillingInterval::Lifetime => CheckoutMode::Payment,
            BillingInterval::Monthly | BillingInterval::Yearly => CheckoutMode::Subscription,
        };

        let request = CheckoutRequest {
            customer_id,
            price_id,
            mode,
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            client_reference_id: user_id.to_string(),
            metadata: vec![
                ("user_id".to_string(), user_id.to_string()),
                ("plan_type".to_string(), plan_type.as_str().to_string()),
                ("interval".to_string(), interval.as_str().to_string()),
            ],
        };

        let session = self.gateway.create_checkout_session(&request).await?;
        info!(
            %user_id,
            session_id = %session.id,
            plan_type = plan_type.as_str(),
            interval = interval.as_str(),
            "Created checkout session"
        );

        Ok(CheckoutLink {
            session_id: session.id,
            url: session.url,
        })
    }

    /// Verifies and applies a raw webhook delivery
    ///
    /// Nothing is read or written before the signature checks out. `now` is
    /// the current unix time used for the timestamp tolerance.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
        now: i64,
    ) -> Result<WebhookOutcome, BillingError> {
        let header = signature.ok_or(SignatureError::MissingHeader)?;
        verify_signature(payload, header, &self.webhook_secret, self.tolerance_secs, now)?;

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        self.process_event(&event).await
    }

    /// Applies an already verified event
    pub async fn process_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, BillingError> {
        if self.store.is_event_processed(&event.id).await? {
            debug!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook event");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => self.on_checkout_completed(event).await?,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.on_subscription_changed(event).await?
            }
            "customer.subscription.deleted" => self.on_subscription_deleted(event).await?,
            "invoice.payment_succeeded" => self.on_payment_succeeded(event).await?,
            "invoice.payment_failed" => self.on_payment_failed(event).await?,
            _ => WebhookOutcome::Ignored,
        };

        self.store.record_event(&event.id, &event.event_type).await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = outcome.as_str(),
            livemode = event.livemode,
            "Handled Stripe webhook"
        );
        Ok(outcome)
    }

    /// Projects a Stripe subscription onto the user's plan and premium flag
    ///
    /// Returns None when `event_at` is older than what the plan reflects.
    pub async fn update_user_subscription(
        &self,
        user_id: Uuid,
        subscription: &StripeSubscription,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PremiumPlan>, BillingError> {
        self.reconcile(user_id, subscription, event_at, None).await
    }

    /// Cancels the user's subscription at the end of the current period
    ///
    /// Premium access stays until the period ends; only the expiry moves.
    pub async fn cancel_subscription(
        &self,
        user_id: Uuid,
    ) -> Result<SubscriptionSummary, BillingError> {
        let plan = self
            .store
            .current_subscription_plan(user_id)
            .await?
            .ok_or(BillingError::NoActiveSubscription)?;
        let subscription_id = plan
            .stripe_subscription_id
            .as_deref()
            .ok_or(BillingError::NoActiveSubscription)?;

        let subscription = self.gateway.cancel_at_period_end(subscription_id).await?;

        self.store.set_cancel_at_period_end(plan.id, true).await?;
        let ends_at = subscription.period_end().or(plan.current_period_end);
        self.store.set_premium_expiry(user_id, ends_at).await?;

        info!(%user_id, %subscription_id, ends_at = ?ends_at, "Subscription set to cancel at period end");
        self.subscription_status(user_id).await
    }

    /// Cancels a subscription at Stripe right away and revokes premium
    pub async fn cancel_subscription_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<PremiumPlan, BillingError> {
        let plan = self
            .store
            .plan_by_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;

        let subscription = self.gateway.cancel_immediately(subscription_id).await?;

        let plan = self
            .store
            .update_plan_status(
                plan.id,
                PlanStatus::Canceled,
                Some(subscription.status.as_str()),
                None,
            )
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;
        self.store.set_premium(plan.user_id, false, None, None).await?;

        warn!(user_id = %plan.user_id, %subscription_id, "Subscription canceled immediately");
        Ok(plan)
    }

    pub async fn subscription_status(
        &self,
        user_id: Uuid,
    ) -> Result<SubscriptionSummary, BillingError> {
        let account = self
            .store
            .account(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;
        let plan = self.store.latest_plan(user_id).await?;

        Ok(SubscriptionSummary {
            is_premium: account.is_premium,
            premium_plan_type: account.premium_plan_type,
            premium_expiry: account.premium_expiry,
            plan,
        })
    }

    async fn on_checkout_completed(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let session: CheckoutSession = event
            .object()
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        let (outcome, user_id) = match session.mode {
            CheckoutMode::Subscription => {
                let subscription_id = session
                    .subscription
                    .as_ref()
                    .map(|s| s.id().to_string())
                    .ok_or(BillingError::MissingMetadata("subscription"))?;
                let user_id = self.checkout_user(&session).await?;
                let subscription = self.gateway.retrieve_subscription(&subscription_id).await?;

                let outcome = match self
                    .reconcile(user_id, &subscription, event.created_at(), Some(&session.id))
                    .await?
                {
                    Some(_) => WebhookOutcome::Processed,
                    None => WebhookOutcome::Stale,
                };
                (outcome, user_id)
            }
            CheckoutMode::Payment => {
                if session.payment_status.as_deref() == Some("unpaid") {
                    debug!(session_id = %session.id, "Checkout completed without payment");
                    return Ok(WebhookOutcome::Ignored);
                }
                let user_id = self.checkout_user(&session).await?;
                self.grant_lifetime(user_id, &session, event.created_at()).await?;
                (WebhookOutcome::Processed, user_id)
            }
            CheckoutMode::Setup => return Ok(WebhookOutcome::Ignored),
        };

        if outcome == WebhookOutcome::Processed {
            let converted = self.store.convert_referrals(user_id).await?;
            if converted > 0 {
                info!(%user_id, converted, "Referrals converted");
            }
        }

        Ok(outcome)
    }

    async fn grant_lifetime(
        &self,
        user_id: Uuid,
        session: &CheckoutSession,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<(), BillingError> {
        let plan_type = session
            .metadata
            .get("plan_type")
            .and_then(|p| PlanType::from_str(p))
            .unwrap_or(PlanType::Family);

        let now = Utc::now();
        let expiry = now + Duration::days(LIFETIME_DAYS);

        let plan = self
            .store
            .insert_lifetime_plan(UpsertPremiumPlan {
                user_id,
                plan_type,
                billing_interval: BillingInterval::Lifetime,
                status: PlanStatus::Active,
                stripe_subscription_id: None,
                stripe_subscription_status: None,
                stripe_price_id: self
                    .prices
                    .price_for(plan_type, BillingInterval::Lifetime)
                    .map(str::to_string),
                stripe_checkout_session_id: Some(session.id.clone()),
                is_trial: false,
                is_lifetime: true,
                cancel_at_period_end: false,
                current_period_start: Some(now),
                current_period_end: Some(expiry),
                trial_ends_at: None,
                canceled_at: None,
                card: None,
                last_event_at: event_at,
            })
            .await?;

        let expiry = plan.current_period_end.unwrap_or(expiry);
        self.store
            .set_premium(user_id, true, Some(plan_type), Some(expiry))
            .await?;

        info!(%user_id, plan_id = %plan.id, plan_type = plan_type.as_str(), "Lifetime plan granted");
        Ok(())
    }

    async fn on_subscription_changed(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let subscription: StripeSubscription = event
            .object()
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let user_id = self.subscription_user(&subscription).await?;

        match self
            .reconcile(user_id, &subscription, event.created_at(), None)
            .await?
        {
            Some(_) => Ok(WebhookOutcome::Processed),
            None => Ok(WebhookOutcome::Stale),
        }
    }

    async fn on_subscription_deleted(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let subscription: StripeSubscription = event
            .object()
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        self.retire_plan(
            &subscription.id,
            PlanStatus::Canceled,
            subscription.status.as_str(),
            event.created_at(),
        )
        .await
    }

    async fn on_payment_succeeded(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, BillingError> {
        let invoice: Invoice = event
            .object()
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let Some(subscription_id) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::Ignored);
        };

        let subscription = self.gateway.retrieve_subscription(subscription_id).await?;
        let user_id = self.subscription_user(&subscription).await?;

        let Some(plan) = self
            .reconcile(user_id, &subscription, event.created_at(), None)
            .await?
        else {
            return Ok(WebhookOutcome::Stale);
        };

        self.store
            .set_next_billing_date(plan.id, subscription.period_end())
            .await?;
        Ok(WebhookOutcome::Processed)
    }

    async fn on_payment_failed(&self, event: &StripeEvent) -> Result<WebhookOutcome, BillingError> {
        let invoice: Invoice = event
            .object()
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let Some(subscription_id) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::Ignored);
        };

        self.retire_plan(
            subscription_id,
            PlanStatus::PastDue,
            SubscriptionStatus::PastDue.as_str(),
            event.created_at(),
        )
        .await
    }

    /// Moves a known plan to a non-granting status and re-derives premium
    async fn retire_plan(
        &self,
        subscription_id: &str,
        status: PlanStatus,
        stripe_status: &str,
        event_at: Option<DateTime<Utc>>,
    ) -> Result<WebhookOutcome, BillingError> {
        let Some(plan) = self.store.plan_by_subscription(subscription_id).await? else {
            debug!(%subscription_id, "No plan for subscription");
            return Ok(WebhookOutcome::Ignored);
        };

        if event_at.is_some_and(|at| plan.is_stale_event(at)) {
            return Ok(WebhookOutcome::Stale);
        }

        self.store
            .update_plan_status(plan.id, status, Some(stripe_status), event_at)
            .await?;
        self.revoke_unless_covered(plan.user_id, plan.id).await?;

        info!(
            user_id = %plan.user_id,
            %subscription_id,
            status = status.as_str(),
            "Plan no longer grants premium"
        );
        Ok(WebhookOutcome::Processed)
    }

    async fn reconcile(
        &self,
        user_id: Uuid,
        subscription: &StripeSubscription,
        event_at: Option<DateTime<Utc>>,
        checkout_session_id: Option<&str>,
    ) -> Result<Option<PremiumPlan>, BillingError> {
        let status = subscription.status;
        let plan_type = self.subscription_plan_type(subscription);
        let price = subscription.price();
        let billing_interval = price
            .and_then(|p| p.recurring.as_ref())
            .and_then(|r| BillingInterval::from_stripe_interval(&r.interval))
            .or_else(|| {
                subscription
                    .metadata
                    .get("interval")
                    .and_then(|i| BillingInterval::from_str(i))
            })
            .unwrap_or(BillingInterval::Monthly);

        let upsert = UpsertPremiumPlan {
            user_id,
            plan_type,
            billing_interval,
            status: status.plan_status(),
            stripe_subscription_id: Some(subscription.id.clone()),
            stripe_subscription_status: Some(status.as_str().to_string()),
            stripe_price_id: price.map(|p| p.id.clone()),
            stripe_checkout_session_id: checkout_session_id.map(str::to_string),
            is_trial: status == SubscriptionStatus::Trialing,
            is_lifetime: false,
            cancel_at_period_end: subscription.cancel_at_period_end,
            current_period_start: subscription.period_start(),
            current_period_end: subscription.period_end(),
            trial_ends_at: subscription.trial_ends_at(),
            canceled_at: subscription.canceled_at(),
            card: subscription.card(),
            last_event_at: event_at,
        };

        let Some(plan) = self.store.upsert_subscription_plan(upsert).await? else {
            debug!(%user_id, subscription_id = %subscription.id, "Stale subscription event skipped");
            return Ok(None);
        };

        if status.grants_premium() {
            self.grant_premium(user_id, plan_type, subscription.period_end())
                .await?;
        } else {
            self.revoke_unless_covered(user_id, plan.id).await?;
        }

        debug!(
            %user_id,
            subscription_id = %subscription.id,
            status = status.as_str(),
            "Subscription reconciled"
        );
        Ok(Some(plan))
    }

    /// Marks the user premium without shortening an expiry or downgrading
    /// a family plan they already hold
    async fn grant_premium(
        &self,
        user_id: Uuid,
        plan_type: PlanType,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), BillingError> {
        let (plan_type, expiry) = match self.store.account(user_id).await? {
            Some(account) if account.is_premium => {
                let plan_type = match account.premium_plan_type {
                    Some(PlanType::Family) => PlanType::Family,
                    _ => plan_type,
                };
                let expiry = match (account.premium_expiry, expiry) {
                    (Some(held), Some(new)) => Some(held.max(new)),
                    (_, new) => new,
                };
                (plan_type, expiry)
            }
            _ => (plan_type, expiry),
        };

        self.store
            .set_premium(user_id, true, Some(plan_type), expiry)
            .await?;
        Ok(())
    }

    async fn revoke_unless_covered(&self, user_id: Uuid, plan_id: Uuid) -> Result<(), BillingError> {
        if self.store.has_other_active_plan(user_id, plan_id).await? {
            debug!(%user_id, "Another plan keeps premium access");
            return Ok(());
        }
        self.store.set_premium(user_id, false, None, None).await?;
        Ok(())
    }

    fn subscription_plan_type(&self, subscription: &StripeSubscription) -> PlanType {
        subscription
            .metadata
            .get("plan_type")
            .and_then(|p| PlanType::from_str(p))
            .or_else(|| {
                subscription
                    .price()
                    .and_then(|p| self.prices.plan_type_for_price(&p.id))
            })
            .unwrap_or(PlanType::Individual)
    }

    /// Owner of a subscription: known plan, then metadata, then customer
    async fn subscription_user(
        &self,
        subscription: &StripeSubscription,
    ) -> Result<Uuid, BillingError> {
        if let Some(plan) = self.store.plan_by_subscription(&subscription.id).await? {
            return Ok(plan.user_id);
        }

        if let Some(user_id) = self
            .known_user(subscription.metadata.get("user_id").map(String::as_str))
            .await?
        {
            return Ok(user_id);
        }

        let customer_id = subscription.customer.id();
        self.store
            .account_by_customer(customer_id)
            .await?
            .map(|account| account.user_id)
            .ok_or_else(|| BillingError::UserNotFound(customer_id.to_string()))
    }

    /// Buyer of a checkout: client reference, then metadata, then customer
    async fn checkout_user(&self, session: &CheckoutSession) -> Result<Uuid, BillingError> {
        if let Some(user_id) = self.known_user(session.client_reference_id.as_deref()).await? {
            return Ok(user_id);
        }

        if let Some(user_id) = self
            .known_user(session.metadata.get("user_id").map(String::as_str))
            .await?
        {
            return Ok(user_id);
        }

        let customer_id = session
            .customer
            .as_ref()
            .map(|c| c.id().to_string())
            .ok_or(BillingError::MissingMetadata("customer"))?;
        self.store
            .account_by_customer(&customer_id)
            .await?
            .map(|account| account.user_id)
            .ok_or_else(|| BillingError::UserNotFound(customer_id.clone()))
    }

    async fn known_user(&self, raw: Option<&str>) -> Result<Option<Uuid>, BillingError> {
        let Some(user_id) = raw.and_then(|r| Uuid::parse_str(r).ok()) else {
            return Ok(None);
        };
        Ok(self.store.account(user_id).await?.map(|a| a.user_id))
    }
}
