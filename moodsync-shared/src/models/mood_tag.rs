/// Custom mood tags
///
/// Tags are scoped to their owner; names are unique per user.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE custom_mood_tags (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     name VARCHAR(50) NOT NULL,
///     color VARCHAR(7) NOT NULL,
///     icon VARCHAR(50),
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (user_id, name)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const TAG_COLUMNS: &str = "id, user_id, name, color, icon, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CustomMoodTag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,

    /// `#RRGGBB`
    pub color: String,

    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMoodTag {
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMoodTag {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// Checks a `#RRGGBB` color string
pub fn is_valid_hex_color(color: &str) -> bool {
    let bytes = color.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(|b| b.is_ascii_hexdigit())
}

impl CustomMoodTag {
    /// # Errors
    ///
    /// Fails with a unique violation if the user already has a tag by that name.
    pub async fn create(pool: &PgPool, data: CreateMoodTag) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO custom_mood_tags (user_id, name, color, icon)
            VALUES ($1, $2, $3, $4)
            RETURNING {TAG_COLUMNS}
            "#
        );

        sqlx::query_as::<_, CustomMoodTag>(&query)
            .bind(data.user_id)
            .bind(data.name)
            .bind(data.color)
            .bind(data.icon)
            .fetch_one(pool)
            .await
    }

    /// Lists a user's tags by name, optionally only active ones
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TAG_COLUMNS} FROM custom_mood_tags \
             WHERE user_id = $1 AND ($2 = FALSE OR is_active = TRUE) ORDER BY name"
        );
        sqlx::query_as::<_, CustomMoodTag>(&query)
            .bind(user_id)
            .bind(active_only)
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        data: UpdateMoodTag,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE custom_mood_tags SET updated_at = NOW()");
        let mut bind_count = 2;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.color.is_some() {
            bind_count += 1;
            query.push_str(&format!(", color = ${}", bind_count));
        }
        if data.icon.is_some() {
            bind_count += 1;
            query.push_str(&format!(", icon = ${}", bind_count));
        }
        if data.is_active.is_some() {
            bind_count += 1;
            query.push_str(&format!(", is_active = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND user_id = $2 RETURNING {TAG_COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, CustomMoodTag>(&query)
            .bind(id)
            .bind(user_id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(color) = data.color {
            q = q.bind(color);
        }
        if let Some(icon) = data.icon {
            q = q.bind(icon);
        }
        if let Some(is_active) = data.is_active {
            q = q.bind(is_active);
        }

        q.fetch_optional(pool).await
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM custom_mood_tags WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_color_validation() {
        assert!(is_valid_hex_color("#A1b2C3"));
        assert!(is_valid_hex_color("#000000"));
        assert!(!is_valid_hex_color("A1B2C3"));
        assert!(!is_valid_hex_color("#A1B2C"));
        assert!(!is_valid_hex_color("#GGGGGG"));
        assert!(!is_valid_hex_color("#A1B2C3D"));
    }
}
