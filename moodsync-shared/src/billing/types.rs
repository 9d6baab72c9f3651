/// Stripe API payloads
///
/// Only the fields MoodSync reads are modelled; everything else in Stripe's
/// JSON is ignored. Fields that Stripe may return either as an id or as an
/// expanded object use [`Expandable`].

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::premium_plan::{CardDetails, PlanStatus};

/// An id or the expanded object it refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T: HasId> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id(),
        }
    }

    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(obj) => Some(obj),
        }
    }
}

pub trait HasId {
    fn id(&self) -> &str;
}

/// Converts a Stripe unix timestamp
pub fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Webhook event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix time the event was created at Stripe
    pub created: i64,

    pub data: EventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Deserializes `data.object` into a typed payload
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data.object)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.created)
    }
}

/// Stripe subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Paused => "paused",
        }
    }

    /// Local plan status for this Stripe status
    pub fn plan_status(&self) -> PlanStatus {
        match self {
            SubscriptionStatus::Active => PlanStatus::Active,
            SubscriptionStatus::Trialing => PlanStatus::Trialing,
            SubscriptionStatus::PastDue => PlanStatus::PastDue,
            SubscriptionStatus::Unpaid => PlanStatus::Unpaid,
            SubscriptionStatus::Incomplete => PlanStatus::Incomplete,
            SubscriptionStatus::Paused => PlanStatus::Paused,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired => {
                PlanStatus::Canceled
            }
        }
    }

    pub fn grants_premium(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,
}

impl HasId for StripeCustomer {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub brand: String,
    pub last4: String,
    pub exp_month: i32,
    pub exp_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,

    #[serde(default)]
    pub card: Option<Card>,
}

impl HasId for PaymentMethod {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurring {
    /// `day`, `week`, `month` or `year`
    pub interval: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,

    #[serde(default)]
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,

    /// Newer API versions report billing periods per item
    #[serde(default)]
    pub current_period_start: Option<i64>,

    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Expandable<StripeCustomer>,
    pub status: SubscriptionStatus,

    #[serde(default)]
    pub current_period_start: Option<i64>,

    #[serde(default)]
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    #[serde(default)]
    pub canceled_at: Option<i64>,

    #[serde(default)]
    pub trial_end: Option<i64>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub items: List<SubscriptionItem>,

    #[serde(default)]
    pub default_payment_method: Option<Expandable<PaymentMethod>>,
}

impl HasId for StripeSubscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl StripeSubscription {
    fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.data.first()
    }

    pub fn price(&self) -> Option<&Price> {
        self.first_item().map(|item| &item.price)
    }

    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start
            .or_else(|| self.first_item().and_then(|i| i.current_period_start))
            .and_then(timestamp)
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))
            .and_then(timestamp)
    }

    pub fn trial_ends_at(&self) -> Option<DateTime<Utc>> {
        self.trial_end.and_then(timestamp)
    }

    pub fn canceled_at(&self) -> Option<DateTime<Utc>> {
        self.canceled_at.and_then(timestamp)
    }

    /// Card of the default payment method, when it was expanded
    pub fn card(&self) -> Option<CardDetails> {
        let card = self
            .default_payment_method
            .as_ref()?
            .as_object()?
            .card
            .as_ref()?;

        Some(CardDetails {
            brand: card.brand.clone(),
            last4: card.last4.clone(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    Payment,
    Subscription,
    Setup,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
            CheckoutMode::Setup => "setup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub mode: CheckoutMode,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub customer: Option<Expandable<StripeCustomer>>,

    #[serde(default)]
    pub subscription: Option<Expandable<StripeSubscription>>,

    #[serde(default)]
    pub client_reference_id: Option<String>,

    /// `paid`, `unpaid` or `no_payment_required`
    #[serde(default)]
    pub payment_status: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,

    #[serde(default)]
    pub customer: Option<Expandable<StripeCustomer>>,

    #[serde(default)]
    pub subscription: Option<Expandable<StripeSubscription>>,

    /// Where newer API versions put the subscription reference
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
}

impl Invoice {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.id()).or_else(|| {
            self.parent
                .as_ref()?
                .subscription_details
                .as_ref()?
                .subscription
                .as_deref()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subscription_json() -> serde_json::Value {
        json!({
            "id": "sub_123",
            "object": "subscription",
            "customer": "cus_123",
            "status": "active",
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "cancel_at_period_end": false,
            "metadata": { "user_id": "0b6c2c1e-8d7a-4d8e-9a51-2d3f4b5c6d7e" },
            "items": { "object": "list", "data": [
                { "price": { "id": "price_monthly", "recurring": { "interval": "month" } } }
            ]},
            "default_payment_method": {
                "id": "pm_1",
                "card": { "brand": "visa", "last4": "4242", "exp_month": 12, "exp_year": 2030 }
            }
        })
    }

    #[test]
    fn test_subscription_parses() {
        let sub: StripeSubscription = serde_json::from_value(subscription_json()).unwrap();

        assert_eq!(sub.id, "sub_123");
        assert_eq!(sub.customer.id(), "cus_123");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.price().unwrap().id, "price_monthly");
        assert_eq!(sub.period_end().unwrap().timestamp(), 1_702_592_000);

        let card = sub.card().unwrap();
        assert_eq!(card.brand, "visa");
        assert_eq!(card.last4, "4242");
    }

    #[test]
    fn test_unexpanded_payment_method_has_no_card() {
        let mut value = subscription_json();
        value["default_payment_method"] = json!("pm_1");
        let sub: StripeSubscription = serde_json::from_value(value).unwrap();

        assert_eq!(sub.default_payment_method.as_ref().unwrap().id(), "pm_1");
        assert!(sub.card().is_none());
    }

    #[test]
    fn test_period_falls_back_to_items() {
        let mut value = subscription_json();
        value.as_object_mut().unwrap().remove("current_period_end");
        value["items"]["data"][0]["current_period_end"] = json!(1_705_000_000);
        let sub: StripeSubscription = serde_json::from_value(value).unwrap();

        assert_eq!(sub.period_end().unwrap().timestamp(), 1_705_000_000);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SubscriptionStatus::Active.plan_status(), PlanStatus::Active);
        assert_eq!(SubscriptionStatus::Trialing.plan_status(), PlanStatus::Trialing);
        assert_eq!(SubscriptionStatus::PastDue.plan_status(), PlanStatus::PastDue);
        assert_eq!(
            SubscriptionStatus::IncompleteExpired.plan_status(),
            PlanStatus::Canceled
        );

        let granting: Vec<_> = [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Paused,
        ]
        .into_iter()
        .filter(|s| s.grants_premium())
        .collect();
        assert_eq!(
            granting,
            vec![SubscriptionStatus::Active, SubscriptionStatus::Trialing]
        );
    }

    #[test]
    fn test_invoice_subscription_id_locations() {
        let legacy: Invoice =
            serde_json::from_value(json!({ "id": "in_1", "subscription": "sub_9" })).unwrap();
        assert_eq!(legacy.subscription_id(), Some("sub_9"));

        let nested: Invoice = serde_json::from_value(json!({
            "id": "in_2",
            "parent": { "subscription_details": { "subscription": "sub_7" } }
        }))
        .unwrap();
        assert_eq!(nested.subscription_id(), Some("sub_7"));

        let one_off: Invoice = serde_json::from_value(json!({ "id": "in_3" })).unwrap();
        assert_eq!(one_off.subscription_id(), None);
    }

    #[test]
    fn test_event_object() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "created": 1_700_000_100,
            "data": { "object": subscription_json() }
        }))
        .unwrap();

        assert_eq!(event.event_type, "customer.subscription.updated");
        let sub: StripeSubscription = event.object().unwrap();
        assert_eq!(sub.id, "sub_123");
        assert_eq!(event.created_at().unwrap().timestamp(), 1_700_000_100);
    }
}
