/// Database models for MoodSync
///
/// Each model owns its SQL. Handlers and services call these operations
/// directly with a `PgPool`.
///
/// # Models
///
/// - `user`: Accounts, premium flags, preferences
/// - `premium_plan`: Premium subscriptions and lifetime purchases
/// - `webhook_event`: Processed Stripe webhook event ids
/// - `family_member`: Family sharing edges with permission flags
/// - `referral`: Referral invitations and their progression
/// - `emotion_story`: Stories, moments, comments and reactions
/// - `mood_tag`: User-defined mood tags
///
/// # Example
///
/// ```no_run
/// use moodsync_shared::models::user::{User, CreateUser};
/// use moodsync_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "river@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     username: "river".to_string(),
///     display_name: None,
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod emotion_story;
pub mod family_member;
pub mod mood_tag;
pub mod premium_plan;
pub mod referral;
pub mod user;
pub mod webhook_event;
