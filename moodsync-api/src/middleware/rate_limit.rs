/// Rate limiting middleware for authenticated endpoints
///
/// Consumes one token from the caller's Redis bucket before the handler
/// runs. Premium users get a larger bucket (see
/// [`moodsync_shared::redis::RateLimit`]).
///
/// When Redis is not configured the layer passes requests through. When
/// Redis is configured but failing, requests are let through and the
/// failure is logged.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Requests allowed per minute
/// - `X-RateLimit-Remaining`: Tokens left in the bucket
/// - `Retry-After`: Seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Extension, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use moodsync_shared::auth::middleware::AuthContext;
use moodsync_shared::redis::{RateLimit, RateLimitDecision};

pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return Ok(next.run(request).await);
    };

    let limit = RateLimit::for_user(auth.is_premium);

    let decision = match limiter.check(auth.user_id, limit).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %auth.user_id, "Rate limit check failed, allowing request");
            return Ok(next.run(request).await);
        }
    };

    if !decision.allowed {
        tracing::debug!(
            user_id = %auth.user_id,
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );
        return Err(rate_limit_error(&decision));
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    Ok(response)
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
}

fn rate_limit_error(decision: &RateLimitDecision) -> ApiError {
    ApiError::RateLimitExceeded {
        retry_after: decision.retry_after,
        message: format!(
            "Rate limit exceeded. Try again in {} seconds",
            decision.retry_after
        ),
    }
}
