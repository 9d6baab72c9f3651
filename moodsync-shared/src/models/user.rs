/// User model and database operations
///
/// Users carry their own premium projection (`is_premium`,
/// `premium_plan_type`, `premium_expiry`). Those three columns are written
/// by the billing subsystem only; profile endpoints never touch them.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email CITEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     username VARCHAR(50) NOT NULL UNIQUE,
///     display_name VARCHAR(100),
///     avatar_url VARCHAR(512),
///     bio TEXT,
///     is_premium BOOLEAN NOT NULL DEFAULT FALSE,
///     premium_plan_type VARCHAR(20),
///     premium_expiry TIMESTAMPTZ,
///     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     stripe_customer_id VARCHAR(255) UNIQUE,
///     referral_code VARCHAR(16) NOT NULL UNIQUE,
///     preferences JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::premium_plan::PlanType;

const USER_COLUMNS: &str = "id, email, password_hash, username, display_name, avatar_url, bio, \
     is_premium, premium_plan_type, premium_expiry, is_admin, stripe_customer_id, \
     referral_code, preferences, created_at, updated_at, last_login_at";

/// Referral codes avoid characters that are easy to misread (0/O, 1/I)
const REFERRAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERRAL_CODE_LENGTH: usize = 8;

/// Display theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Per-user preferences stored as JSONB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub theme: Theme,

    /// BCP 47 language tag, e.g. "en" or "pt-BR"
    pub language: String,

    pub email_notifications: bool,

    pub push_notifications: bool,

    /// Daily mood check-ins the user aims for
    pub daily_mood_goal: Option<u8>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            language: "en".to_string(),
            email_notifications: true,
            push_notifications: true,
            daily_mood_goal: None,
        }
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Email address (case-insensitive via CITEXT)
    pub email: String,

    /// Argon2id hash, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub username: String,

    pub display_name: Option<String>,

    pub avatar_url: Option<String>,

    pub bio: Option<String>,

    /// Whether the user currently has premium access
    pub is_premium: bool,

    /// `individual` or `family` while premium
    pub premium_plan_type: Option<String>,

    /// When premium access lapses (99 years out for lifetime purchases)
    pub premium_expiry: Option<DateTime<Utc>>,

    /// Grants access to admin endpoints
    pub is_admin: bool,

    pub stripe_customer_id: Option<String>,

    /// Code other users enter at signup to credit this user
    pub referral_code: String,

    pub preferences: Json<UserPreferences>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Parsed premium plan type
    pub fn plan_type(&self) -> Option<PlanType> {
        self.premium_plan_type.as_deref().and_then(PlanType::from_str)
    }

    /// Name shown to other users
    pub fn public_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,

    pub username: String,

    pub display_name: Option<String>,
}

/// Profile fields a user may edit
///
/// `Some(None)` clears a field, `None` leaves it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub display_name: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

/// Generates a random referral code
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LENGTH)
        .map(|_| REFERRAL_CODE_ALPHABET[rng.gen_range(0..REFERRAL_CODE_ALPHABET.len())] as char)
        .collect()
}

impl User {
    /// Creates a user with a fresh referral code and default preferences
    ///
    /// # Errors
    ///
    /// Fails on a duplicate email or username (unique constraint violation).
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, username, display_name, referral_code, preferences)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.username)
            .bind(data.display_name)
            .bind(generate_referral_code())
            .bind(Json(UserPreferences::default()))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_referral_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(code.to_uppercase())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_stripe_customer_id(
        pool: &PgPool,
        customer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE stripe_customer_id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(customer_id)
            .fetch_optional(pool)
            .await
    }

    /// Updates editable profile fields
    ///
    /// Returns None if the user doesn't exist.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.display_name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", display_name = ${}", bind_count));
        }
        if data.avatar_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", avatar_url = ${}", bind_count));
        }
        if data.bio.is_some() {
            bind_count += 1;
            query.push_str(&format!(", bio = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {USER_COLUMNS}"));

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);

        if let Some(display_name) = data.display_name {
            q = q.bind(display_name);
        }
        if let Some(avatar_url) = data.avatar_url {
            q = q.bind(avatar_url);
        }
        if let Some(bio) = data.bio {
            q = q.bind(bio);
        }

        q.fetch_optional(pool).await
    }

    /// Replaces the user's preferences
    pub async fn update_preferences(
        pool: &PgPool,
        id: Uuid,
        preferences: UserPreferences,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET preferences = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(Json(preferences))
            .fetch_optional(pool)
            .await
    }

    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stores the Stripe customer id created for this user
    pub async fn set_stripe_customer_id(
        pool: &PgPool,
        id: Uuid,
        customer_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(customer_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Writes the premium projection
    ///
    /// `plan_type` and `expiry` are written as given, so passing None clears
    /// them.
    pub async fn set_premium(
        pool: &PgPool,
        id: Uuid,
        is_premium: bool,
        plan_type: Option<PlanType>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_premium = $2, premium_plan_type = $3, premium_expiry = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(is_premium)
        .bind(plan_type.map(|p| p.as_str()))
        .bind(expiry)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sets only the premium expiry, leaving `is_premium` untouched
    pub async fn set_premium_expiry(
        pool: &PgPool,
        id: Uuid,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET premium_expiry = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(expiry)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clears premium for users whose expiry has passed
    ///
    /// Users holding an active, trialing or lifetime plan keep premium even
    /// when its period end has passed; renewals roll the period before the
    /// webhook arrives, and webhooks own those plans. Returns the ids of the
    /// users that were downgraded.
    pub async fn expire_lapsed_premium(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE users u
            SET is_premium = FALSE, premium_plan_type = NULL, updated_at = NOW()
            WHERE u.is_premium = TRUE
              AND u.premium_expiry IS NOT NULL
              AND u.premium_expiry <= $1
              AND NOT EXISTS (
                  SELECT 1 FROM premium_plans p
                  WHERE p.user_id = u.id
                    AND (p.is_lifetime = TRUE OR p.status IN ('active', 'trialing'))
              )
            RETURNING u.id
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_code_format() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
        assert!(code.bytes().all(|b| REFERRAL_CODE_ALPHABET.contains(&b)));
        assert!(!code.contains('0') && !code.contains('O'));
    }

    #[test]
    fn test_preferences_fill_missing_fields() {
        let prefs: UserPreferences = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.language, "en");
        assert!(prefs.email_notifications);
        assert_eq!(prefs.daily_mood_goal, None);
    }

    #[test]
    fn test_update_profile_default() {
        let update = UpdateProfile::default();
        assert!(update.display_name.is_none());
        assert!(update.avatar_url.is_none());
        assert!(update.bio.is_none());
    }
}
