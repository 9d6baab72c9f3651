/// Emotion story endpoints
///
/// # Endpoints
///
/// - `GET    /v1/stories` - My stories
/// - `POST   /v1/stories` - Create a story
/// - `GET    /v1/stories/public?limit=&offset=` - Public feed
/// - `GET    /v1/stories/:id` - Story with moments and reactions
/// - `PUT    /v1/stories/:id`, `DELETE /v1/stories/:id` - Owner only
/// - `POST   /v1/stories/:id/moments` - Append a moment (owner)
/// - `PUT    /v1/stories/:id/moments/:moment_id`, `DELETE ...` - Owner only
/// - `GET    /v1/stories/:id/comments`, `POST ...` - Anyone who can see the story
/// - `DELETE /v1/stories/:id/comments/:comment_id` - Author or story owner
/// - `GET    /v1/stories/:id/reactions`, `POST ...`
/// - `DELETE /v1/stories/:id/reactions/:reaction_type`
///
/// A private story is reported as not found to anyone but its owner.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use moodsync_shared::{
    auth::middleware::AuthContext,
    models::emotion_story::{
        CreateMoment, CreateStory, EmotionMoment, EmotionStory, ReactionCounts, ReactionType,
        StoryComment, StoryReaction, UpdateMoment, UpdateStory,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::double_option;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStoryRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub is_public: bool,

    #[validate(length(max = 50, message = "Cover emotion must be at most 50 characters"))]
    pub cover_emotion: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStoryRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<Option<String>>,

    pub is_public: Option<bool>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 50, message = "Cover emotion must be at most 50 characters"))]
    pub cover_emotion: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MomentRequest {
    #[validate(length(min = 1, max = 50, message = "Emotion must be 1-50 characters"))]
    pub emotion: String,

    #[validate(range(min = 1, max = 10, message = "Intensity must be between 1 and 10"))]
    pub intensity: i32,

    pub note: Option<String>,

    /// Bounded so `MAX(sort_order) + 1` appends stay inside INTEGER
    #[validate(range(min = 0, max = 1_000_000, message = "Sort order must be between 0 and 1000000"))]
    pub sort_order: Option<i32>,

    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMomentRequest {
    #[validate(length(min = 1, max = 50, message = "Emotion must be 1-50 characters"))]
    pub emotion: Option<String>,

    #[validate(range(min = 1, max = 10, message = "Intensity must be between 1 and 10"))]
    pub intensity: Option<i32>,

    #[serde(default, deserialize_with = "double_option")]
    pub note: Option<Option<String>>,

    #[validate(range(min = 0, max = 1_000_000, message = "Sort order must be between 0 and 1000000"))]
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 2000, message = "Comment must be 1-2000 characters"))]
    pub content: String,

    /// Comment being replied to; must belong to the same story
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub reaction_type: ReactionType,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Serialize)]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: EmotionStory,
    pub moments: Vec<EmotionMoment>,
    pub reactions: ReactionSummary,
}

#[derive(Debug, Serialize)]
pub struct ReactionSummary {
    pub counts: ReactionCounts,

    /// Reactions left by the caller
    pub mine: Vec<ReactionType>,
}

async fn visible_story(state: &AppState, id: Uuid, viewer: Uuid) -> ApiResult<EmotionStory> {
    EmotionStory::find_visible(&state.db, id, viewer)
        .await?
        .ok_or_else(story_not_found)
}

async fn owned_story(state: &AppState, id: Uuid, owner: Uuid) -> ApiResult<EmotionStory> {
    let story = visible_story(state, id, owner).await?;
    if story.user_id != owner {
        return Err(ApiError::Forbidden("Only the author can change this story".to_string()));
    }
    Ok(story)
}

fn story_not_found() -> ApiError {
    ApiError::NotFound("Story not found".to_string())
}

async fn reaction_summary(state: &AppState, story_id: Uuid, viewer: Uuid) -> ApiResult<ReactionSummary> {
    Ok(ReactionSummary {
        counts: StoryReaction::counts(&state.db, story_id).await?,
        mine: StoryReaction::for_user(&state.db, story_id, viewer).await?,
    })
}

pub async fn list_own(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<EmotionStory>>> {
    Ok(Json(EmotionStory::list_for_user(&state.db, auth.user_id).await?))
}

pub async fn list_public(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<EmotionStory>>> {
    let (limit, offset) = page.bounds();
    Ok(Json(EmotionStory::list_public(&state.db, limit, offset).await?))
}

pub async fn create_story(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateStoryRequest>,
) -> ApiResult<(StatusCode, Json<EmotionStory>)> {
    req.validate()?;

    let story = EmotionStory::create(
        &state.db,
        CreateStory {
            user_id: auth.user_id,
            title: req.title.trim().to_string(),
            description: req.description,
            is_public: req.is_public,
            cover_emotion: req.cover_emotion,
        },
    )
    .await?;

    tracing::debug!(story_id = %story.id, user_id = %auth.user_id, "Story created");
    Ok((StatusCode::CREATED, Json(story)))
}

pub async fn get_story(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StoryDetail>> {
    let story = visible_story(&state, id, auth.user_id).await?;
    let moments = EmotionMoment::list_for_story(&state.db, story.id).await?;
    let reactions = reaction_summary(&state, story.id, auth.user_id).await?;

    Ok(Json(StoryDetail {
        story,
        moments,
        reactions,
    }))
}

pub async fn update_story(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStoryRequest>,
) -> ApiResult<Json<EmotionStory>> {
    req.validate()?;

    let story = EmotionStory::update(
        &state.db,
        id,
        auth.user_id,
        UpdateStory {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            is_public: req.is_public,
            cover_emotion: req.cover_emotion,
        },
    )
    .await?
    .ok_or_else(story_not_found)?;

    Ok(Json(story))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !EmotionStory::delete(&state.db, id, auth.user_id).await? {
        return Err(story_not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_moment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<MomentRequest>,
) -> ApiResult<(StatusCode, Json<EmotionMoment>)> {
    req.validate()?;
    let story = owned_story(&state, id, auth.user_id).await?;

    let moment = EmotionMoment::create(
        &state.db,
        story.id,
        CreateMoment {
            emotion: req.emotion,
            intensity: req.intensity,
            note: req.note,
            sort_order: req.sort_order,
            occurred_at: req.occurred_at,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(moment)))
}

pub async fn update_moment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, moment_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateMomentRequest>,
) -> ApiResult<Json<EmotionMoment>> {
    req.validate()?;
    let story = owned_story(&state, id, auth.user_id).await?;

    let moment = EmotionMoment::update(
        &state.db,
        moment_id,
        story.id,
        UpdateMoment {
            emotion: req.emotion,
            intensity: req.intensity,
            note: req.note,
            sort_order: req.sort_order,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Moment not found".to_string()))?;

    Ok(Json(moment))
}

pub async fn delete_moment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, moment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let story = owned_story(&state, id, auth.user_id).await?;
    if !EmotionMoment::delete(&state.db, moment_id, story.id).await? {
        return Err(ApiError::NotFound("Moment not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StoryComment>>> {
    let story = visible_story(&state, id, auth.user_id).await?;
    Ok(Json(StoryComment::list_for_story(&state.db, story.id).await?))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<StoryComment>)> {
    req.validate()?;
    let story = visible_story(&state, id, auth.user_id).await?;

    if let Some(parent_id) = req.parent_id {
        let parent = StoryComment::find_by_id(&state.db, parent_id).await?;
        if parent.map(|p| p.story_id) != Some(story.id) {
            return Err(ApiError::invalid_field(
                "parent_id",
                "Parent comment does not belong to this story",
            ));
        }
    }

    let comment = StoryComment::create(
        &state.db,
        story.id,
        auth.user_id,
        req.parent_id,
        req.content.trim(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Deletes a comment; allowed for its author and the story owner
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, comment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let story = visible_story(&state, id, auth.user_id).await?;

    let belongs = StoryComment::find_by_id(&state.db, comment_id)
        .await?
        .is_some_and(|c| c.story_id == story.id);

    if !belongs || !StoryComment::delete(&state.db, comment_id, auth.user_id).await? {
        return Err(ApiError::NotFound("Comment not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ReactionSummary>> {
    let story = visible_story(&state, id, auth.user_id).await?;
    Ok(Json(reaction_summary(&state, story.id, auth.user_id).await?))
}

/// Adds a reaction; repeating the same type is a no-op
pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<Json<ReactionSummary>> {
    let story = visible_story(&state, id, auth.user_id).await?;
    StoryReaction::add(&state.db, story.id, auth.user_id, req.reaction_type).await?;
    Ok(Json(reaction_summary(&state, story.id, auth.user_id).await?))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, reaction_type)): Path<(Uuid, String)>,
) -> ApiResult<Json<ReactionSummary>> {
    let kind = ReactionType::from_str(&reaction_type)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown reaction type: {}", reaction_type)))?;

    let story = visible_story(&state, id, auth.user_id).await?;
    StoryReaction::remove(&state.db, story.id, auth.user_id, kind).await?;
    Ok(Json(reaction_summary(&state, story.id, auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let page = PageQuery {
            limit: None,
            offset: None,
        };
        assert_eq!(page.bounds(), (DEFAULT_PAGE_SIZE, 0));

        let page = PageQuery {
            limit: Some(1000),
            offset: Some(-5),
        };
        assert_eq!(page.bounds(), (MAX_PAGE_SIZE, 0));
    }

    #[test]
    fn test_moment_intensity_range() {
        let req: MomentRequest =
            serde_json::from_str(r#"{"emotion": "calm", "intensity": 11}"#).unwrap();
        assert!(req.validate().is_err());

        let req: MomentRequest =
            serde_json::from_str(r#"{"emotion": "calm", "intensity": 7}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_moment_sort_order_range() {
        let req: MomentRequest = serde_json::from_str(
            r#"{"emotion": "calm", "intensity": 3, "sort_order": 2147483647}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());

        let req: MomentRequest =
            serde_json::from_str(r#"{"emotion": "calm", "intensity": 3, "sort_order": -1}"#)
                .unwrap();
        assert!(req.validate().is_err());

        let req: UpdateMomentRequest =
            serde_json::from_str(r#"{"sort_order": 2147483647}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateMomentRequest = serde_json::from_str(r#"{"sort_order": 12}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_reaction_request_parses_lowercase() {
        let req: ReactionRequest = serde_json::from_str(r#"{"reaction_type": "hug"}"#).unwrap();
        assert_eq!(req.reaction_type, ReactionType::Hug);
        assert!(serde_json::from_str::<ReactionRequest>(r#"{"reaction_type": "meh"}"#).is_err());
    }
}
