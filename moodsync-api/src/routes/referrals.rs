/// Referral endpoints
///
/// # Endpoints
///
/// - `GET  /v1/referrals` - My referral code and invitations
/// - `POST /v1/referrals` - Invite someone by email
/// - `GET  /v1/referrals/stats` - Counts per status and bounty progress

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use moodsync_shared::{
    auth::middleware::AuthContext,
    models::{
        referral::{Referral, ReferralStats},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ReferralList {
    pub referral_code: String,
    pub referrals: Vec<Referral>,
}

pub async fn list_referrals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ReferralList>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let referrals = Referral::list_for_referrer(&state.db, auth.user_id).await?;

    Ok(Json(ReferralList {
        referral_code: user.referral_code,
        referrals,
    }))
}

/// Records a pending invitation that expires after 30 days
///
/// # Errors
///
/// - `400 Bad Request`: Inviting your own email
/// - `409 Conflict`: Email already registered or already invited
pub async fn invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<Referral>)> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    if email.eq_ignore_ascii_case(&auth.email) {
        return Err(ApiError::BadRequest("You cannot refer yourself".to_string()));
    }
    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("That email already has an account".to_string()));
    }

    let referral = Referral::create(&state.db, auth.user_id, &email)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict("Email already invited".to_string()),
            other => other,
        })?;

    tracing::info!(referrer_id = %auth.user_id, referral_id = %referral.id, "Referral invitation created");
    Ok((StatusCode::CREATED, Json(referral)))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ReferralStats>> {
    Ok(Json(Referral::stats(&state.db, auth.user_id).await?))
}
