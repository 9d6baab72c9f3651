/// Family sharing model and database operations
///
/// An owner invites another user, who may accept or reject while the invite
/// is pending. Either side can remove the edge afterwards. Four independent
/// flags control what the owner shares with the member.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE family_members (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     member_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     relationship VARCHAR(50) NOT NULL,
///     status VARCHAR(20) NOT NULL DEFAULT 'pending',
///     can_view_mood BOOLEAN NOT NULL DEFAULT FALSE,
///     can_view_journal BOOLEAN NOT NULL DEFAULT FALSE,
///     can_receive_alerts BOOLEAN NOT NULL DEFAULT FALSE,
///     can_transfer_tokens BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (owner_id, member_id),
///     CHECK (owner_id <> member_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const FAMILY_COLUMNS: &str = "id, owner_id, member_id, relationship, status, can_view_mood, \
     can_view_journal, can_receive_alerts, can_transfer_tokens, created_at, updated_at";

/// Maximum pending or accepted members per owner
pub const MAX_FAMILY_MEMBERS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyMemberStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FamilyMemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyMemberStatus::Pending => "pending",
            FamilyMemberStatus::Accepted => "accepted",
            FamilyMemberStatus::Rejected => "rejected",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FamilyMemberStatus::Pending),
            "accepted" => Some(FamilyMemberStatus::Accepted),
            "rejected" => Some(FamilyMemberStatus::Rejected),
            _ => None,
        }
    }
}

/// What the owner shares with a member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyPermissions {
    pub can_view_mood: bool,
    pub can_view_journal: bool,
    pub can_receive_alerts: bool,
    pub can_transfer_tokens: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FamilyMember {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub member_id: Uuid,

    /// Free-form label such as "parent" or "sibling"
    pub relationship: String,

    pub status: String,
    pub can_view_mood: bool,
    pub can_view_journal: bool,
    pub can_receive_alerts: bool,
    pub can_transfer_tokens: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FamilyMember {
    pub fn member_status(&self) -> Option<FamilyMemberStatus> {
        FamilyMemberStatus::from_str(&self.status)
    }

    pub fn permissions(&self) -> FamilyPermissions {
        FamilyPermissions {
            can_view_mood: self.can_view_mood,
            can_view_journal: self.can_view_journal,
            can_receive_alerts: self.can_receive_alerts,
            can_transfer_tokens: self.can_transfer_tokens,
        }
    }

    /// Whether `user_id` is either end of this edge
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.member_id == user_id
    }
}

/// Family edge joined with the other user's public profile
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FamilyMemberWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub member: FamilyMember,

    /// The other side's user id, username and display name
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateFamilyMember {
    pub owner_id: Uuid,
    pub member_id: Uuid,
    pub relationship: String,
    pub permissions: FamilyPermissions,
}

/// Permission changes; None leaves a flag untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePermissions {
    pub can_view_mood: Option<bool>,
    pub can_view_journal: Option<bool>,
    pub can_receive_alerts: Option<bool>,
    pub can_transfer_tokens: Option<bool>,
}

impl FamilyMember {
    /// Creates a pending invitation
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if the pair already exists.
    pub async fn create(pool: &PgPool, data: CreateFamilyMember) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO family_members (
                owner_id, member_id, relationship, status,
                can_view_mood, can_view_journal, can_receive_alerts, can_transfer_tokens
            )
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7)
            RETURNING {FAMILY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FamilyMember>(&query)
            .bind(data.owner_id)
            .bind(data.member_id)
            .bind(data.relationship)
            .bind(data.permissions.can_view_mood)
            .bind(data.permissions.can_view_journal)
            .bind(data.permissions.can_receive_alerts)
            .bind(data.permissions.can_transfer_tokens)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {FAMILY_COLUMNS} FROM family_members WHERE id = $1");
        sqlx::query_as::<_, FamilyMember>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Members invited by `owner_id`, with the member's profile
    pub async fn list_for_owner(
        pool: &PgPool,
        owner_id: Uuid,
    ) -> Result<Vec<FamilyMemberWithUser>, sqlx::Error> {
        sqlx::query_as::<_, FamilyMemberWithUser>(
            r#"
            SELECT f.id, f.owner_id, f.member_id, f.relationship, f.status,
                   f.can_view_mood, f.can_view_journal, f.can_receive_alerts,
                   f.can_transfer_tokens, f.created_at, f.updated_at,
                   u.id AS user_id, u.username, u.display_name
            FROM family_members f
            JOIN users u ON u.id = f.member_id
            WHERE f.owner_id = $1
            ORDER BY f.created_at
            "#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }

    /// Families `member_id` was invited into, with the owner's profile
    pub async fn list_for_member(
        pool: &PgPool,
        member_id: Uuid,
    ) -> Result<Vec<FamilyMemberWithUser>, sqlx::Error> {
        sqlx::query_as::<_, FamilyMemberWithUser>(
            r#"
            SELECT f.id, f.owner_id, f.member_id, f.relationship, f.status,
                   f.can_view_mood, f.can_view_journal, f.can_receive_alerts,
                   f.can_transfer_tokens, f.created_at, f.updated_at,
                   u.id AS user_id, u.username, u.display_name
            FROM family_members f
            JOIN users u ON u.id = f.owner_id
            WHERE f.member_id = $1
            ORDER BY f.created_at
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await
    }

    /// Pending plus accepted members of an owner
    pub async fn count_active_for_owner(pool: &PgPool, owner_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM family_members WHERE owner_id = $1 AND status <> 'rejected'",
        )
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn exists(pool: &PgPool, owner_id: Uuid, member_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM family_members WHERE owner_id = $1 AND member_id = $2)",
        )
        .bind(owner_id)
        .bind(member_id)
        .fetch_one(pool)
        .await
    }

    /// Accepts or rejects a pending invitation addressed to `member_id`
    ///
    /// Returns None when no pending invitation with that id belongs to the
    /// member.
    pub async fn respond(
        pool: &PgPool,
        id: Uuid,
        member_id: Uuid,
        accept: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let status = if accept {
            FamilyMemberStatus::Accepted
        } else {
            FamilyMemberStatus::Rejected
        };

        let query = format!(
            r#"
            UPDATE family_members
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND member_id = $2 AND status = 'pending'
            RETURNING {FAMILY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FamilyMember>(&query)
            .bind(id)
            .bind(member_id)
            .bind(status.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Updates sharing flags; only the owner may do this
    pub async fn update_permissions(
        pool: &PgPool,
        id: Uuid,
        owner_id: Uuid,
        data: UpdatePermissions,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE family_members
            SET can_view_mood = COALESCE($3, can_view_mood),
                can_view_journal = COALESCE($4, can_view_journal),
                can_receive_alerts = COALESCE($5, can_receive_alerts),
                can_transfer_tokens = COALESCE($6, can_transfer_tokens),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING {FAMILY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, FamilyMember>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(data.can_view_mood)
            .bind(data.can_view_journal)
            .bind(data.can_receive_alerts)
            .bind(data.can_transfer_tokens)
            .fetch_optional(pool)
            .await
    }

    /// Removes an edge; either the owner or the member may do this
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM family_members WHERE id = $1 AND (owner_id = $2 OR member_id = $2)",
        )
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
    fn test_status_roundtrip() {
        for status in [
            FamilyMemberStatus::Pending,
            FamilyMemberStatus::Accepted,
            FamilyMemberStatus::Rejected,
        ] {
            assert_eq!(FamilyMemberStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_permissions_default_to_nothing_shared() {
        let perms: FamilyPermissions = serde_json::from_str(r#"{"can_view_mood":true}"#).unwrap();
        assert!(perms.can_view_mood);
        assert!(!perms.can_view_journal);
        assert!(!perms.can_receive_alerts);
        assert!(!perms.can_transfer_tokens);
    }

    #[test]
    fn test_involves_either_side() {
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let now = Utc::now();
        let edge = FamilyMember {
            id: Uuid::new_v4(),
            owner_id: owner,
            member_id: member,
            relationship: "parent".to_string(),
            status: "pending".to_string(),
            can_view_mood: true,
            can_view_journal: false,
            can_receive_alerts: false,
            can_transfer_tokens: false,
            created_at: now,
            updated_at: now,
        };

        assert!(edge.involves(owner));
        assert!(edge.involves(member));
        assert!(!edge.involves(Uuid::new_v4()));
        assert_eq!(edge.member_status(), Some(FamilyMemberStatus::Pending));
        assert!(edge.permissions().can_view_mood);
    }
}
