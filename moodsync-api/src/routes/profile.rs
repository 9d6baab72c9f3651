/// Profile endpoints
///
/// - `GET  /v1/profile`
/// - `PUT  /v1/profile`
/// - `PUT  /v1/profile/preferences`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use moodsync_shared::{
    auth::middleware::AuthContext,
    models::user::{UpdateProfile, User, UserPreferences},
};
use serde::Deserialize;
use validator::Validate;

use super::double_option;

/// Omitted fields stay as they are; explicit `null` clears them
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(url(message = "avatar_url must be a URL"))]
    pub avatar_url: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<Option<String>>,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let user = User::update_profile(
        &state.db,
        auth.user_id,
        UpdateProfile {
            display_name: req.display_name,
            avatar_url: req.avatar_url,
            bio: req.bio,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Replaces all preferences; missing fields take their defaults
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(preferences): Json<UserPreferences>,
) -> ApiResult<Json<User>> {
    if preferences.language.trim().is_empty() {
        return Err(ApiError::invalid_field("language", "Language must not be empty"));
    }
    if preferences.daily_mood_goal.is_some_and(|g| g == 0 || g > 24) {
        return Err(ApiError::invalid_field(
            "daily_mood_goal",
            "Daily mood goal must be between 1 and 24",
        ));
    }

    let user = User::update_preferences(&state.db, auth.user_id, preferences)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_profile_null_vs_missing() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"display_name": null, "bio": "hello"}"#).unwrap();

        assert_eq!(req.display_name, Some(None));
        assert_eq!(req.avatar_url, None);
        assert_eq!(req.bio, Some(Some("hello".to_string())));
    }

    #[test]
    fn test_update_profile_validation() {
        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"avatar_url": "not a url"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProfileRequest =
            serde_json::from_str(r#"{"avatar_url": "https://cdn.moodsync.app/a.png"}"#).unwrap();
        assert!(req.validate().is_ok());
    }
}
