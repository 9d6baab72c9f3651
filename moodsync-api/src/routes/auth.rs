/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register new user
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new pair

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Json};
use moodsync_shared::{
    auth::{
        jwt::{self, TokenPair, TokenType},
        password,
    },
    models::{
        referral::Referral,
        user::{CreateUser, User},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked for strength after the length rule
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,

    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,

    /// Referral code of the user who invited this one
    pub referral_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Registers a new user
///
/// A valid `referral_code` links the new account to the referrer: an open
/// invite for the same email moves to `registered`, otherwise a new
/// `registered` referral is created. Unknown codes are ignored.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: Email or username already exists
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::invalid_field("password", e))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_lowercase(),
            password_hash,
            username: req.username.trim().to_string(),
            display_name: req.display_name.clone(),
        },
    )
    .await?;

    if let Some(code) = req.referral_code.as_deref().filter(|c| !c.trim().is_empty()) {
        link_referral(&state, code.trim(), &user).await?;
    }

    tracing::info!(user_id = %user.id, "User registered");

    let tokens = issue_tokens(&state, user.id)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

async fn link_referral(state: &AppState, code: &str, user: &User) -> ApiResult<()> {
    let Some(referrer) = User::find_by_referral_code(&state.db, code).await? else {
        tracing::debug!(code = %code, "Unknown referral code at registration");
        return Ok(());
    };

    if referrer.id == user.id {
        return Ok(());
    }

    match Referral::register(&state.db, referrer.id, &user.email, user.id).await? {
        Some(referral) => {
            tracing::info!(referral_id = %referral.id, referrer_id = %referrer.id, "Referral registered")
        }
        None => tracing::debug!(referrer_id = %referrer.id, "Referral already past registration"),
    }
    Ok(())
}

/// Authenticates with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(invalid());
    }

    User::update_last_login(&state.db, user.id).await?;

    let tokens = issue_tokens(&state, user.id)?;
    Ok(Json(AuthResponse { user, tokens }))
}

/// Exchanges a refresh token for a new token pair
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired or non-refresh token, or the
///   user no longer exists
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = jwt::decode_token(&req.refresh_token, state.jwt_secret(), TokenType::Refresh)?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    Ok(Json(issue_tokens(&state, user.id)?))
}

fn issue_tokens(state: &AppState, user_id: Uuid) -> ApiResult<TokenPair> {
    let jwt_config = &state.config.jwt;
    Ok(jwt::issue_token_pair(
        user_id,
        state.jwt_secret(),
        jwt_config.access_ttl(),
        jwt_config.refresh_ttl(),
    )?)
}
