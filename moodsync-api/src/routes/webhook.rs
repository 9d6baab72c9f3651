/// Stripe webhook endpoint
///
/// ```text
/// POST /webhook
/// Stripe-Signature: t=1700000000,v1=5257a869...
///
/// <raw event JSON>
/// ```
///
/// The body is taken as raw bytes because the signature covers the exact
/// payload. Responds `200 {"received": true, "outcome": "processed"}` for
/// every verified event, including duplicates and ignored types. A bad
/// signature is a `400 invalid_signature` and touches nothing.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use moodsync_shared::billing::WebhookOutcome;
use serde::Serialize;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .billing
        .handle_webhook(signature, &body, Utc::now().timestamp())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook rejected");
            e
        })?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
