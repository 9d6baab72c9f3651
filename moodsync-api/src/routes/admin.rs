/// Admin endpoints
///
/// Mounted behind the admin check in [`crate::app::build_router`].

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use moodsync_shared::{auth::middleware::AuthContext, models::premium_plan::PremiumPlan};

/// Cancels a subscription immediately and revokes premium
///
/// ```text
/// POST /v1/admin/subscriptions/:subscription_id/cancel
/// ```
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<PremiumPlan>> {
    let plan = state
        .billing
        .cancel_subscription_immediately(&subscription_id)
        .await?;

    tracing::info!(
        admin_id = %auth.user_id,
        subscription_id = %subscription_id,
        user_id = %plan.user_id,
        "Subscription canceled by admin"
    );
    Ok(Json(plan))
}
