/// Authentication utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and policy
/// - [`jwt`]: HS256 access and refresh tokens
/// - [`middleware`]: Bearer authentication and the request `AuthContext`
///
/// # Example
///
/// ```no_run
/// use moodsync_shared::auth::password::{hash_password, verify_password};
/// use moodsync_shared::auth::jwt::issue_token_pair;
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password1")?;
/// assert!(verify_password("user_password1", &hash)?);
///
/// let tokens = issue_token_pair(Uuid::new_v4(), "secret", Duration::hours(1), Duration::days(30))?;
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
pub mod password;
