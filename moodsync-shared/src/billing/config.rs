/// Stripe configuration
///
/// # Environment Variables
///
/// - `STRIPE_SECRET_KEY` (required)
/// - `STRIPE_WEBHOOK_SECRET` (required)
/// - `STRIPE_MONTHLY_PRICE_ID`: individual, monthly
/// - `STRIPE_YEARLY_PRICE_ID`: individual, yearly
/// - `STRIPE_FAMILY_PRICE_ID`: family, monthly or yearly
/// - `STRIPE_FAMILY_LIFETIME_PRICE_ID`: family, one-off lifetime payment
/// - `STRIPE_API_BASE` (default: `https://api.stripe.com/v1`)
/// - `STRIPE_WEBHOOK_TOLERANCE_SECS` (default: 300)
///
/// Unset price ids are allowed; checkout for that plan then fails with
/// "price not configured".

use std::env;

use crate::models::premium_plan::{BillingInterval, PlanType};

use super::signature::DEFAULT_TOLERANCE_SECS;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum BillingConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Stripe price ids per plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceConfig {
    pub monthly: Option<String>,
    pub yearly: Option<String>,
    pub family: Option<String>,
    pub family_lifetime: Option<String>,
}

impl PriceConfig {
    /// Price id for a plan; None when unconfigured or unsold
    ///
    /// Individual lifetime plans are not sold.
    pub fn price_for(&self, plan_type: PlanType, interval: BillingInterval) -> Option<&str> {
        let price = match (plan_type, interval) {
            (PlanType::Individual, BillingInterval::Monthly) => &self.monthly,
            (PlanType::Individual, BillingInterval::Yearly) => &self.yearly,
            (PlanType::Individual, BillingInterval::Lifetime) => return None,
            (PlanType::Family, BillingInterval::Monthly | BillingInterval::Yearly) => &self.family,
            (PlanType::Family, BillingInterval::Lifetime) => &self.family_lifetime,
        };
        price.as_deref().filter(|p| !p.is_empty())
    }

    /// Plan type a configured price belongs to
    pub fn plan_type_for_price(&self, price_id: &str) -> Option<PlanType> {
        let matches = |p: &Option<String>| p.as_deref() == Some(price_id);

        if matches(&self.monthly) || matches(&self.yearly) {
            Some(PlanType::Individual)
        } else if matches(&self.family) || matches(&self.family_lifetime) {
            Some(PlanType::Family)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub prices: PriceConfig,
    pub api_base: String,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn from_env() -> Result<Self, BillingConfigError> {
        dotenvy::dotenv().ok();

        let required = |name: &'static str| {
            env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(BillingConfigError::Missing(name))
        };
        let optional = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());

        let webhook_tolerance_secs = match env::var("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Ok(value) => value
                .parse()
                .map_err(|_| BillingConfigError::InvalidValue {
                    name: "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    value,
                })?,
            Err(_) => DEFAULT_TOLERANCE_SECS,
        };

        Ok(Self {
            secret_key: required("STRIPE_SECRET_KEY")?,
            webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            prices: PriceConfig {
                monthly: optional("STRIPE_MONTHLY_PRICE_ID"),
                yearly: optional("STRIPE_YEARLY_PRICE_ID"),
                family: optional("STRIPE_FAMILY_PRICE_ID"),
                family_lifetime: optional("STRIPE_FAMILY_LIFETIME_PRICE_ID"),
            },
            api_base: optional("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            webhook_tolerance_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> PriceConfig {
        PriceConfig {
            monthly: Some("price_m".to_string()),
            yearly: Some("price_y".to_string()),
            family: Some("price_f".to_string()),
            family_lifetime: Some("price_fl".to_string()),
        }
    }

    #[test]
    fn test_price_table() {
        let p = prices();
        assert_eq!(p.price_for(PlanType::Individual, BillingInterval::Monthly), Some("price_m"));
        assert_eq!(p.price_for(PlanType::Individual, BillingInterval::Yearly), Some("price_y"));
        assert_eq!(p.price_for(PlanType::Family, BillingInterval::Monthly), Some("price_f"));
        assert_eq!(p.price_for(PlanType::Family, BillingInterval::Yearly), Some("price_f"));
        assert_eq!(p.price_for(PlanType::Family, BillingInterval::Lifetime), Some("price_fl"));
        assert_eq!(p.price_for(PlanType::Individual, BillingInterval::Lifetime), None);
    }

    #[test]
    fn test_missing_price() {
        let p = PriceConfig {
            yearly: Some(String::new()),
            ..PriceConfig::default()
        };
        assert_eq!(p.price_for(PlanType::Individual, BillingInterval::Monthly), None);
        assert_eq!(p.price_for(PlanType::Individual, BillingInterval::Yearly), None);
    }

    #[test]
    fn test_plan_type_for_price() {
        let p = prices();
        assert_eq!(p.plan_type_for_price("price_y"), Some(PlanType::Individual));
        assert_eq!(p.plan_type_for_price("price_fl"), Some(PlanType::Family));
        assert_eq!(p.plan_type_for_price("price_unknown"), None);
    }
}
