/// Stripe REST client
///
/// Speaks Stripe's form-encoded v1 API with bearer authentication. Only the
/// endpoints behind [`PaymentGateway`] are covered.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::StripeConfig;
use super::gateway::{CheckoutRequest, GatewayError, PaymentGateway};
use super::types::{CheckoutMode, CheckoutSession, StripeSubscription};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,

    #[serde(default)]
    message: Option<String>,

    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(&self.secret_key)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(&self.secret_key)
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.http.delete(self.url(path)).bearer_auth(&self.secret_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let error = serde_json::from_str::<ErrorResponse>(&body).ok().map(|r| r.error);
        let message = error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("HTTP {}", status));

        warn!(
            status = status.as_u16(),
            error_type = ?error.as_ref().and_then(|e| e.error_type.clone()),
            message = %message,
            "Stripe request failed"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(message));
        }

        Err(GatewayError::Api {
            status: status.as_u16(),
            code: error.and_then(|e| e.code),
            message,
        })
    }
}

/// Form fields for a checkout session
fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("customer".to_string(), request.customer_id.clone()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
    ];

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
        if request.mode == CheckoutMode::Subscription {
            form.push((format!("subscription_data[metadata][{}]", key), value.clone()));
        }
    }

    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String, GatewayError> {
        let form = [
            ("email", email.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];

        let created: CreatedObject = self.send(self.post("customers").form(&form)).await?;
        debug!(customer_id = %created.id, %user_id, "Created Stripe customer");
        Ok(created.id)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = checkout_form(request);
        self.send(self.post("checkout/sessions").form(&form)).await
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.send(
            self.get(&format!("subscriptions/{}", subscription_id))
                .query(&[("expand[]", "default_payment_method")]),
        )
        .await
    }

    async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.send(
            self.post(&format!("subscriptions/{}", subscription_id))
                .form(&[("cancel_at_period_end", "true")]),
        )
        .await
    }

    async fn cancel_immediately(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, GatewayError> {
        self.send(self.delete(&format!("subscriptions/{}", subscription_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: CheckoutMode) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: "cus_1".to_string(),
            price_id: "price_1".to_string(),
            mode,
            success_url: "https://app.example/success".to_string(),
            cancel_url: "https://app.example/cancel".to_string(),
            client_reference_id: "user-1".to_string(),
            metadata: vec![("plan_type".to_string(), "family".to_string())],
        }
    }

    fn has(form: &[(String, String)], key: &str, value: &str) -> bool {
        form.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn test_subscription_checkout_form_copies_metadata_to_subscription() {
        let form = checkout_form(&request(CheckoutMode::Subscription));
        assert!(has(&form, "mode", "subscription"));
        assert!(has(&form, "line_items[0][price]", "price_1"));
        assert!(has(&form, "metadata[plan_type]", "family"));
        assert!(has(&form, "subscription_data[metadata][plan_type]", "family"));
        assert!(has(&form, "client_reference_id", "user-1"));
    }

    #[test]
    fn test_payment_checkout_form_has_no_subscription_data() {
        let form = checkout_form(&request(CheckoutMode::Payment));
        assert!(has(&form, "mode", "payment"));
        assert!(form.iter().all(|(k, _)| !k.starts_with("subscription_data")));
    }

    #[test]
    fn test_url_joining() {
        let client = StripeClient::new(&StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec".to_string(),
            prices: Default::default(),
            api_base: "http://localhost:12111/v1/".to_string(),
            webhook_tolerance_secs: 300,
        })
        .unwrap();

        assert_eq!(
            client.url("/subscriptions/sub_1"),
            "http://localhost:12111/v1/subscriptions/sub_1"
        );
    }
}
