/// Stripe billing
///
/// - [`signature`]: `Stripe-Signature` verification
/// - [`types`]: Stripe payloads
/// - [`gateway`] / [`stripe`] / [`mock`]: outgoing Stripe calls
/// - [`store`] / [`pg_store`] / [`memory`]: persistence seam
/// - [`service`]: checkout, cancellation and webhook reconciliation

pub mod config;
pub mod gateway;
pub mod memory;
pub mod mock;
pub mod pg_store;
pub mod service;
pub mod signature;
pub mod store;
pub mod stripe;
pub mod types;

pub use config::{BillingConfigError, PriceConfig, StripeConfig};
pub use gateway::{CheckoutRequest, GatewayError, PaymentGateway};
pub use pg_store::PgBillingStore;
pub use service::{
    BillingError, CheckoutLink, SubscriptionService, SubscriptionSummary, WebhookOutcome,
};
pub use signature::SignatureError;
pub use store::{BillingAccount, BillingStore, StoreError};
pub use stripe::StripeClient;
