/// Emotion stories, their moments, comments and reactions
///
/// A story owns an ordered list of moments. Ordering is an explicit
/// `sort_order` integer; appending without one takes `max + 1` and nothing
/// is ever renumbered. Private stories are only visible to their owner.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE emotion_stories (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT,
///     is_public BOOLEAN NOT NULL DEFAULT FALSE,
///     cover_emotion VARCHAR(50),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE emotion_moments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     story_id UUID NOT NULL REFERENCES emotion_stories(id) ON DELETE CASCADE,
///     emotion VARCHAR(50) NOT NULL,
///     intensity INTEGER NOT NULL CHECK (intensity BETWEEN 1 AND 10),
///     note TEXT,
///     sort_order INTEGER NOT NULL,
///     occurred_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Comments (`story_comments`) may reply to one other comment of the same
/// story. Reactions (`story_reactions`) are unique per story, user and type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const STORY_COLUMNS: &str =
    "id, user_id, title, description, is_public, cover_emotion, created_at, updated_at";

const MOMENT_COLUMNS: &str =
    "id, story_id, emotion, intensity, note, sort_order, occurred_at, created_at";

const COMMENT_COLUMNS: &str = "id, story_id, user_id, parent_id, content, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmotionStory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub cover_emotion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmotionStory {
    /// Whether `viewer` may read this story
    pub fn is_visible_to(&self, viewer: Uuid) -> bool {
        self.is_public || self.user_id == viewer
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStory {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub cover_emotion: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStory {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub cover_emotion: Option<Option<String>>,
}

impl EmotionStory {
    pub async fn create(pool: &PgPool, data: CreateStory) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO emotion_stories (user_id, title, description, is_public, cover_emotion)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {STORY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, EmotionStory>(&query)
            .bind(data.user_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.is_public)
            .bind(data.cover_emotion)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {STORY_COLUMNS} FROM emotion_stories WHERE id = $1");
        sqlx::query_as::<_, EmotionStory>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a story if `viewer` may see it
    pub async fn find_visible(
        pool: &PgPool,
        id: Uuid,
        viewer: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {STORY_COLUMNS} FROM emotion_stories \
             WHERE id = $1 AND (is_public = TRUE OR user_id = $2)"
        );
        sqlx::query_as::<_, EmotionStory>(&query)
            .bind(id)
            .bind(viewer)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {STORY_COLUMNS} FROM emotion_stories WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, EmotionStory>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Public stories, newest first
    pub async fn list_public(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {STORY_COLUMNS} FROM emotion_stories WHERE is_public = TRUE \
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, EmotionStory>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Updates a story owned by `owner_id`
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        owner_id: Uuid,
        data: UpdateStory,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE emotion_stories SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.is_public.is_some() {
            bind_count += 1;
            query.push_str(&format!(", is_public = ${}", bind_count));
        }
        if data.cover_emotion.is_some() {
            bind_count += 1;
            query.push_str(&format!(", cover_emotion = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND user_id = $2 RETURNING {STORY_COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, EmotionStory>(&query)
            .bind(id)
            .bind(owner_id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(is_public) = data.is_public {
            q = q.bind(is_public);
        }
        if let Some(cover_emotion) = data.cover_emotion {
            q = q.bind(cover_emotion);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a story with its moments, comments and reactions
    pub async fn delete(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM emotion_stories WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmotionMoment {
    pub id: Uuid,
    pub story_id: Uuid,
    pub emotion: String,

    /// 1 to 10
    pub intensity: i32,

    pub note: Option<String>,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMoment {
    pub emotion: String,
    pub intensity: i32,
    pub note: Option<String>,

    /// Appends after the current last moment when None
    pub sort_order: Option<i32>,

    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMoment {
    pub emotion: Option<String>,
    pub intensity: Option<i32>,
    pub note: Option<Option<String>>,
    pub sort_order: Option<i32>,
}

impl EmotionMoment {
    pub async fn create(
        pool: &PgPool,
        story_id: Uuid,
        data: CreateMoment,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO emotion_moments (story_id, emotion, intensity, note, sort_order, occurred_at)
            VALUES (
                $1, $2, $3, $4,
                COALESCE($5, (SELECT COALESCE(MAX(sort_order) + 1, 0) FROM emotion_moments WHERE story_id = $1)),
                COALESCE($6, NOW())
            )
            RETURNING {MOMENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, EmotionMoment>(&query)
            .bind(story_id)
            .bind(data.emotion)
            .bind(data.intensity)
            .bind(data.note)
            .bind(data.sort_order)
            .bind(data.occurred_at)
            .fetch_one(pool)
            .await
    }

    /// Moments of a story in display order
    pub async fn list_for_story(pool: &PgPool, story_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {MOMENT_COLUMNS} FROM emotion_moments WHERE story_id = $1 \
             ORDER BY sort_order, created_at"
        );
        sqlx::query_as::<_, EmotionMoment>(&query)
            .bind(story_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        story_id: Uuid,
        data: UpdateMoment,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (note_set, note) = match data.note {
            Some(note) => (true, note),
            None => (false, None),
        };

        let query = format!(
            r#"
            UPDATE emotion_moments
            SET emotion = COALESCE($3, emotion),
                intensity = COALESCE($4, intensity),
                note = CASE WHEN $5 THEN $6 ELSE note END,
                sort_order = COALESCE($7, sort_order)
            WHERE id = $1 AND story_id = $2
            RETURNING {MOMENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, EmotionMoment>(&query)
            .bind(id)
            .bind(story_id)
            .bind(data.emotion)
            .bind(data.intensity)
            .bind(note_set)
            .bind(note)
            .bind(data.sort_order)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid, story_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM emotion_moments WHERE id = $1 AND story_id = $2")
            .bind(id)
            .bind(story_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoryComment {
    pub id: Uuid,
    pub story_id: Uuid,
    pub user_id: Uuid,

    /// Comment this one replies to
    pub parent_id: Option<Uuid>,

    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoryComment {
    pub async fn create(
        pool: &PgPool,
        story_id: Uuid,
        user_id: Uuid,
        parent_id: Option<Uuid>,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO story_comments (story_id, user_id, parent_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, StoryComment>(&query)
            .bind(story_id)
            .bind(user_id)
            .bind(parent_id)
            .bind(content)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {COMMENT_COLUMNS} FROM story_comments WHERE id = $1");
        sqlx::query_as::<_, StoryComment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Comments of a story, oldest first
    pub async fn list_for_story(pool: &PgPool, story_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM story_comments WHERE story_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, StoryComment>(&query)
            .bind(story_id)
            .fetch_all(pool)
            .await
    }

    /// Deletes a comment; its author or the story owner may do this
    ///
    /// Replies are removed with it.
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM story_comments c
            USING emotion_stories s
            WHERE c.id = $1 AND s.id = c.story_id AND (c.user_id = $2 OR s.user_id = $2)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Reaction kinds a user can leave on a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Heart,
    Hug,
    Support,
    Inspire,
    Relate,
}

impl ReactionType {
    pub const ALL: [ReactionType; 5] = [
        ReactionType::Heart,
        ReactionType::Hug,
        ReactionType::Support,
        ReactionType::Inspire,
        ReactionType::Relate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Heart => "heart",
            ReactionType::Hug => "hug",
            ReactionType::Support => "support",
            ReactionType::Inspire => "inspire",
            ReactionType::Relate => "relate",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "heart" => Some(ReactionType::Heart),
            "hug" => Some(ReactionType::Hug),
            "support" => Some(ReactionType::Support),
            "inspire" => Some(ReactionType::Inspire),
            "relate" => Some(ReactionType::Relate),
            _ => None,
        }
    }
}

/// Per-type reaction counts for a story
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub heart: i64,
    pub hug: i64,
    pub support: i64,
    pub inspire: i64,
    pub relate: i64,
}

impl ReactionCounts {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let mut counts = ReactionCounts::default();
        for (kind, count) in rows {
            match ReactionType::from_str(kind) {
                Some(ReactionType::Heart) => counts.heart += count,
                Some(ReactionType::Hug) => counts.hug += count,
                Some(ReactionType::Support) => counts.support += count,
                Some(ReactionType::Inspire) => counts.inspire += count,
                Some(ReactionType::Relate) => counts.relate += count,
                None => {}
            }
        }
        counts
    }

    pub fn total(&self) -> i64 {
        self.heart + self.hug + self.support + self.inspire + self.relate
    }
}

pub struct StoryReaction;

impl StoryReaction {
    /// Adds a reaction; returns false if the user already left this type
    pub async fn add(
        pool: &PgPool,
        story_id: Uuid,
        user_id: Uuid,
        kind: ReactionType,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO story_reactions (story_id, user_id, reaction_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (story_id, user_id, reaction_type) DO NOTHING
            "#,
        )
        .bind(story_id)
        .bind(user_id)
        .bind(kind.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(
        pool: &PgPool,
        story_id: Uuid,
        user_id: Uuid,
        kind: ReactionType,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM story_reactions WHERE story_id = $1 AND user_id = $2 AND reaction_type = $3",
        )
        .bind(story_id)
        .bind(user_id)
        .bind(kind.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn counts(pool: &PgPool, story_id: Uuid) -> Result<ReactionCounts, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT reaction_type, COUNT(*) FROM story_reactions WHERE story_id = $1 GROUP BY reaction_type",
        )
        .bind(story_id)
        .fetch_all(pool)
        .await?;

        Ok(ReactionCounts::from_rows(
            rows.iter().map(|(kind, count)| (kind.as_str(), *count)),
        ))
    }

    /// Reaction types `user_id` left on a story
    pub async fn for_user(
        pool: &PgPool,
        story_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<ReactionType>, sqlx::Error> {
        let kinds: Vec<String> = sqlx::query_scalar(
            "SELECT reaction_type FROM story_reactions WHERE story_id = $1 AND user_id = $2",
        )
        .bind(story_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(kinds.iter().filter_map(|k| ReactionType::from_str(k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaction_type_roundtrip() {
        for kind in ReactionType::ALL {
            assert_eq!(ReactionType::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ReactionType::from_str("angry"), None);
    }

    #[test]
    fn test_reaction_counts_from_rows() {
        let counts = ReactionCounts::from_rows([("heart", 3), ("hug", 1), ("relate", 2), ("x", 9)]);
        assert_eq!(counts.heart, 3);
        assert_eq!(counts.hug, 1);
        assert_eq!(counts.support, 0);
        assert_eq!(counts.relate, 2);
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn test_private_story_visibility() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let mut story = EmotionStory {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "A week of rain".to_string(),
            description: None,
            is_public: false,
            cover_emotion: Some("calm".to_string()),
            created_at: now,
            updated_at: now,
        };

        assert!(story.is_visible_to(owner));
        assert!(!story.is_visible_to(Uuid::new_v4()));

        story.is_public = true;
        assert!(story.is_visible_to(Uuid::new_v4()));
    }
}
