/// In-memory [`PaymentGateway`] for tests and local development
///
/// Holds subscriptions by id and records every call made against it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::gateway::{CheckoutRequest, GatewayError, PaymentGateway};
use super::types::{CheckoutSession, Expandable, StripeCustomer, StripeSubscription, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CreateCustomer { email: String, user_id: Uuid },
    CreateCheckoutSession(CheckoutRequest),
    RetrieveSubscription(String),
    CancelAtPeriodEnd(String),
    CancelImmediately(String),
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, StripeSubscription>,
    calls: Vec<GatewayCall>,
    customers: u32,
    sessions: u32,
}

#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes a subscription retrievable, replacing any with the same id
    pub fn put_subscription(&self, subscription: StripeSubscription) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn subscription(&self, id: &str) -> Option<StripeSubscription> {
        self.state().subscriptions.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    fn record(&self, call: GatewayCall) {
        self.state().calls.push(call);
    }

    fn update<F>(&self, id: &str, f: F) -> Result<StripeSubscription, GatewayError>
    where
        F: FnOnce(&mut StripeSubscription),
    {
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("No such subscription: '{}'", id)))?;
        f(subscription);
        Ok(subscription.clone())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String, GatewayError> {
        self.record(GatewayCall::CreateCustomer {
            email: email.to_string(),
            user_id,
        });
        let mut state = self.state();
        state.customers += 1;
        Ok(format!("cus_mock_{}", state.customers))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.record(GatewayCall::CreateCheckoutSession(request.clone()));
        let mut state = self.state();
        state.sessions += 1;
        let id = format!("cs_mock_{}", state.sessions);

        Ok(CheckoutSession {
            url: Some(format!("https://checkout.stripe.test/{}", id)),
            id,
            mode: request.mode,
            customer: Some(Expandable::<StripeCustomer>::Id(request.customer_id.clone())),
            subscription: None,
            client_reference_id: Some(request.client_reference_id.clone()),
            payment_status: Some("unpaid".to_string()),
            metadata: request.metadata.iter().cloned().collect(),
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.record(GatewayCall::RetrieveSubscription(subscription_id.to_string()));
        self.update(subscription_id, |_| {})
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.record(GatewayCall::CancelAtPeriodEnd(subscription_id.to_string()));
        self.update(subscription_id, |sub| sub.cancel_at_period_end = true)
    }

    async fn cancel_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.record(GatewayCall::CancelImmediately(subscription_id.to_string()));
        self.update(subscription_id, |sub| {
            sub.status = SubscriptionStatus::Canceled;
            sub.canceled_at = Some(Utc::now().timestamp());
        })
    }
}
