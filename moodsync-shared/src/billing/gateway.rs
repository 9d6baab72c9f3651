/// Payment provider abstraction
///
/// [`PaymentGateway`] is the set of Stripe calls the subscription service
/// makes. [`super::stripe::StripeClient`] implements it over HTTP and
/// [`super::mock::MockGateway`] in memory.

use async_trait::async_trait;
use uuid::Uuid;

use super::types::{CheckoutMode, CheckoutSession, StripeSubscription};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure before Stripe answered
    #[error("Stripe request failed: {0}")]
    Http(String),

    /// Stripe answered with an error object
    #[error("Stripe API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Stripe resource not found: {0}")]
    NotFound(String),

    #[error("Unexpected Stripe response: {0}")]
    Decode(String),
}

/// Parameters for a hosted checkout session
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub mode: CheckoutMode,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,

    /// Attached to the session and, in subscription mode, to the subscription
    pub metadata: Vec<(String, String)>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a customer and returns its id
    async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String, GatewayError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Fetches a subscription with its default payment method expanded
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError>;

    /// Schedules cancellation at the end of the current period
    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError>;

    /// Cancels right away
    async fn cancel_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError>;
}
