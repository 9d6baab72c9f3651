/// Database connection pool management
///
/// Wraps `sqlx::PgPoolOptions` with the settings MoodSync services share and
/// verifies connectivity before handing the pool out.
///
/// # Example
///
/// ```no_run
/// use moodsync_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env()?;
///     let pool = create_pool(config).await?;
///
///     let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
///     assert_eq!(one, 1);
///     Ok(())
/// }
/// ```

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the database connection pool
///
/// Timeouts are in seconds so they map directly onto environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Idle connections kept warm
    pub min_connections: u32,

    /// How long to wait for a free connection (seconds)
    pub acquire_timeout_seconds: u64,

    /// Idle connections older than this are closed (seconds)
    pub idle_timeout_seconds: Option<u64>,

    /// Connections are recycled after this lifetime (seconds)
    pub max_lifetime_seconds: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
        }
    }
}

/// Error loading database configuration
#[derive(Debug, thiserror::Error)]
pub enum DatabaseConfigError {
    /// DATABASE_URL is not set
    #[error("DATABASE_URL environment variable is required")]
    MissingUrl,

    /// A numeric variable could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl DatabaseConfig {
    /// Loads configuration from the environment
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (default: 10)
    /// - `DATABASE_MIN_CONNECTIONS` (default: 1)
    /// - `DATABASE_ACQUIRE_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, DatabaseConfigError> {
        dotenvy::dotenv().ok();

        let url = env::var("DATABASE_URL").map_err(|_| DatabaseConfigError::MissingUrl)?;
        let defaults = Self::default();

        Ok(Self {
            url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: parse_var("DATABASE_MIN_CONNECTIONS", defaults.min_connections)?,
            acquire_timeout_seconds: parse_var(
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_seconds,
            )?,
            ..defaults
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, DatabaseConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| DatabaseConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

/// Creates a PostgreSQL pool and checks that the database answers
///
/// # Errors
///
/// Returns an error if the URL is invalid, the database is unreachable, or
/// the health check query fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_seconds = config.acquire_timeout_seconds,
        "Creating database connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds));

    if let Some(idle) = config.idle_timeout_seconds {
        options = options.idle_timeout(Duration::from_secs(idle));
    }
    if let Some(lifetime) = config.max_lifetime_seconds {
        options = options.max_lifetime(Duration::from_secs(lifetime));
    }

    let pool = options.connect(&config.url).await?;
    health_check(&pool).await?;

    info!("Database connection pool ready");
    Ok(pool)
}

/// Runs `SELECT 1` against the pool
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    let (value,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;

    if value != 1 {
        warn!(value, "Database health check returned unexpected value");
        return Err(sqlx::Error::Protocol(
            "Health check returned unexpected value".into(),
        ));
    }

    debug!("Database health check passed");
    Ok(())
}

/// Closes the pool during shutdown
pub async fn close_pool(pool: PgPool) {
    info!("Closing database connection pool");
    pool.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout_seconds, 30);
        assert_eq!(config.idle_timeout_seconds, Some(600));
        assert_eq!(config.max_lifetime_seconds, Some(1800));
    }

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u32 = parse_var("MOODSYNC_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_config_error_messages() {
        let err = DatabaseConfigError::InvalidValue {
            name: "DATABASE_MAX_CONNECTIONS",
            value: "ten".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for DATABASE_MAX_CONNECTIONS: ten");
        assert_eq!(
            DatabaseConfigError::MissingUrl.to_string(),
            "DATABASE_URL environment variable is required"
        );
    }
}
