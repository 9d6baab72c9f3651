/// Custom mood tag endpoints
///
/// - `GET    /v1/mood-tags?active_only=true`
/// - `POST   /v1/mood-tags`
/// - `PUT    /v1/mood-tags/:id`
/// - `DELETE /v1/mood-tags/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use moodsync_shared::{
    auth::middleware::AuthContext,
    models::mood_tag::{is_valid_hex_color, CreateMoodTag, CustomMoodTag, UpdateMoodTag},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::double_option;

fn check_color(color: &str) -> ApiResult<()> {
    if is_valid_hex_color(color) {
        Ok(())
    } else {
        Err(ApiError::invalid_field("color", "Color must look like #RRGGBB"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,

    /// `#RRGGBB`
    pub color: String,

    #[validate(length(max = 50, message = "Icon must be at most 50 characters"))]
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: Option<String>,

    pub color: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub icon: Option<Option<String>>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<CustomMoodTag>>> {
    let tags = CustomMoodTag::list_for_user(&state.db, auth.user_id, query.active_only).await?;
    Ok(Json(tags))
}

/// # Errors
///
/// - `409 Conflict`: A tag with the same name exists
pub async fn create_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<CustomMoodTag>)> {
    req.validate()?;
    check_color(&req.color)?;

    let tag = CustomMoodTag::create(
        &state.db,
        CreateMoodTag {
            user_id: auth.user_id,
            name: req.name.trim().to_string(),
            color: req.color.to_uppercase(),
            icon: req.icon,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTagRequest>,
) -> ApiResult<Json<CustomMoodTag>> {
    req.validate()?;
    if let Some(color) = req.color.as_deref() {
        check_color(color)?;
    }

    let tag = CustomMoodTag::update(
        &state.db,
        id,
        auth.user_id,
        UpdateMoodTag {
            name: req.name.map(|n| n.trim().to_string()),
            color: req.color.map(|c| c.to_uppercase()),
            icon: req.icon,
            is_active: req.is_active,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Mood tag not found".to_string()))?;

    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !CustomMoodTag::delete(&state.db, id, auth.user_id).await? {
        return Err(ApiError::NotFound("Mood tag not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_check() {
        assert!(check_color("#a1b2c3").is_ok());
        assert!(matches!(check_color("blue"), Err(ApiError::ValidationError(_))));
    }

    #[test]
    fn test_name_length() {
        let req: CreateTagRequest =
            serde_json::from_str(r##"{"name": "", "color": "#FFFFFF"}"##).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_skips_missing_color() {
        let req: UpdateTagRequest = serde_json::from_str(r#"{"is_active": false}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.icon, None);
    }
}
