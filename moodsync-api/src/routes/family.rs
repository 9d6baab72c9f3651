/// Family sharing endpoints
///
/// # Endpoints
///
/// - `GET    /v1/family` - Members I own and families I belong to
/// - `POST   /v1/family/invite` - Invite a user by email
/// - `POST   /v1/family/:id/respond` - Accept or reject an invitation
/// - `PUT    /v1/family/:id/permissions` - Change sharing flags (owner)
/// - `DELETE /v1/family/:id` - Remove the edge (either side)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use moodsync_shared::{
    auth::middleware::AuthContext,
    models::{
        family_member::{
            CreateFamilyMember, FamilyMember, FamilyMemberWithUser, FamilyPermissions,
            UpdatePermissions, MAX_FAMILY_MEMBERS,
        },
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 50, message = "Relationship must be 1-50 characters"))]
    pub relationship: String,

    #[serde(default)]
    pub permissions: FamilyPermissions,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

#[derive(Debug, Serialize)]
pub struct FamilyOverview {
    /// Edges where I am the owner
    pub members: Vec<FamilyMemberWithUser>,

    /// Edges where I am the member
    pub memberships: Vec<FamilyMemberWithUser>,
}

pub async fn list_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<FamilyOverview>> {
    let members = FamilyMember::list_for_owner(&state.db, auth.user_id).await?;
    let memberships = FamilyMember::list_for_member(&state.db, auth.user_id).await?;
    Ok(Json(FamilyOverview {
        members,
        memberships,
    }))
}

/// Creates a pending invitation
///
/// # Errors
///
/// - `404 Not Found`: No user with that email
/// - `400 Bad Request`: Inviting yourself
/// - `409 Conflict`: Already invited, or the family is full
pub async fn invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<FamilyMember>)> {
    req.validate()?;

    let invitee = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("No user with that email".to_string()))?;

    if invitee.id == auth.user_id {
        return Err(ApiError::BadRequest("You cannot invite yourself".to_string()));
    }
    if FamilyMember::exists(&state.db, auth.user_id, invitee.id).await? {
        return Err(ApiError::Conflict("User is already in your family".to_string()));
    }

    let active = FamilyMember::count_active_for_owner(&state.db, auth.user_id).await?;
    if active >= MAX_FAMILY_MEMBERS {
        return Err(ApiError::Conflict(format!(
            "A family can have at most {} members",
            MAX_FAMILY_MEMBERS
        )));
    }

    let member = FamilyMember::create(
        &state.db,
        CreateFamilyMember {
            owner_id: auth.user_id,
            member_id: invitee.id,
            relationship: req.relationship.trim().to_string(),
            permissions: req.permissions,
        },
    )
    .await?;

    tracing::info!(owner_id = %auth.user_id, member_id = %invitee.id, "Family invitation sent");
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn respond(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<FamilyMember>> {
    let member = FamilyMember::respond(&state.db, id, auth.user_id, req.accept)
        .await?
        .ok_or_else(|| ApiError::NotFound("No pending invitation".to_string()))?;
    Ok(Json(member))
}

pub async fn update_permissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePermissions>,
) -> ApiResult<Json<FamilyMember>> {
    let member = FamilyMember::update_permissions(&state.db, id, auth.user_id, req)
        .await?
        .ok_or_else(|| ApiError::NotFound("Family member not found".to_string()))?;
    Ok(Json(member))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !FamilyMember::delete(&state.db, id, auth.user_id).await? {
        return Err(ApiError::NotFound("Family member not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
