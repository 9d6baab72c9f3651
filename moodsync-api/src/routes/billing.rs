/// Billing endpoints for the authenticated user
///
/// # Endpoints
///
/// - `POST /v1/billing/customer` - Get or create the Stripe customer
/// - `POST /v1/billing/checkout` - Start a hosted checkout session
/// - `POST /v1/billing/cancel` - Cancel at the end of the current period
/// - `GET  /v1/billing/status` - Premium flags and current plan

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use moodsync_shared::{
    auth::middleware::AuthContext,
    billing::{CheckoutLink, SubscriptionSummary},
    models::premium_plan::{BillingInterval, PlanType},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub customer_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// `individual` or `family`
    pub plan_type: String,

    /// `monthly`, `yearly` or `lifetime`
    pub interval: String,

    #[validate(url(message = "success_url must be a URL"))]
    pub success_url: String,

    #[validate(url(message = "cancel_url must be a URL"))]
    pub cancel_url: String,
}

pub async fn create_customer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<CustomerResponse>> {
    let customer_id = state.billing.create_customer(auth.user_id).await?;
    Ok(Json(CustomerResponse { customer_id }))
}

/// Creates a checkout session for the chosen plan
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Unknown plan type or interval, bad URLs
/// - `400 Bad Request`: No Stripe price configured for the combination
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutLink>> {
    req.validate()?;

    let plan_type = PlanType::from_str(&req.plan_type)
        .ok_or_else(|| ApiError::invalid_field("plan_type", "Must be individual or family"))?;
    let interval = BillingInterval::from_str(&req.interval).ok_or_else(|| {
        ApiError::invalid_field("interval", "Must be monthly, yearly or lifetime")
    })?;

    let link = state
        .billing
        .create_checkout_session(auth.user_id, plan_type, interval, &req.success_url, &req.cancel_url)
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        session_id = %link.session_id,
        plan_type = plan_type.as_str(),
        interval = interval.as_str(),
        "Checkout session created"
    );
    Ok(Json(link))
}

/// Cancels at period end; premium stays until the period is over
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SubscriptionSummary>> {
    Ok(Json(state.billing.cancel_subscription(auth.user_id).await?))
}

pub async fn subscription_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SubscriptionSummary>> {
    Ok(Json(state.billing.subscription_status(auth.user_id).await?))
}
