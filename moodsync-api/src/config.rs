/// Configuration management for the API server
///
/// Loaded once at startup from environment variables (a `.env` file is
/// honoured in development).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma separated allowed origins, `*` for any (default: *)
/// - `APP_ENV`: `production` enables HSTS (default: development)
/// - `JWT_SECRET`: Secret key for JWT signing (required, 32+ chars)
/// - `JWT_ACCESS_TTL_SECS` (default: 3600), `JWT_REFRESH_TTL_SECS` (default: 2592000)
/// - `DATABASE_*`: see [`moodsync_shared::db::pool::DatabaseConfig`]
/// - `STRIPE_*`: see [`moodsync_shared::billing::StripeConfig`]
/// - `REDIS_URL`: optional, enables rate limiting
///
/// # Example
///
/// ```no_run
/// use moodsync_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;

use chrono::Duration;
use moodsync_shared::billing::StripeConfig;
use moodsync_shared::db::pool::DatabaseConfig;
use moodsync_shared::redis::RedisConfig;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub stripe: StripeConfig,

    /// None disables rate limiting
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    /// Production deployments sit behind HTTPS and send HSTS
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl JwtConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_secs)
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing or a value does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let cors_origins = parse_origins(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()));
        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let access_ttl_secs = env::var("JWT_ACCESS_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<i64>()?;
        let refresh_ttl_secs = env::var("JWT_REFRESH_TTL_SECS")
            .unwrap_or_else(|_| "2592000".to_string())
            .parse::<i64>()?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
            },
            database: DatabaseConfig::from_env()?,
            jwt: JwtConfig {
                secret: jwt_secret,
                access_ttl_secs,
                refresh_ttl_secs,
            },
            stripe: StripeConfig::from_env()?,
            redis: RedisConfig::from_env()?,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodsync_shared::billing::PriceConfig;

    fn config() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                production: false,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                ..Default::default()
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                access_ttl_secs: 3600,
                refresh_ttl_secs: 86400,
            },
            stripe: StripeConfig {
                secret_key: "sk_test".to_string(),
                webhook_secret: "whsec_test".to_string(),
                prices: PriceConfig::default(),
                api_base: "http://localhost:12111/v1".to_string(),
                webhook_tolerance_secs: 300,
            },
            redis: None,
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_jwt_ttls() {
        let jwt = config().jwt;
        assert_eq!(jwt.access_ttl(), Duration::hours(1));
        assert_eq!(jwt.refresh_ttl(), Duration::days(1));
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://moodsync.app, https://admin.moodsync.app,"),
            vec!["https://moodsync.app", "https://admin.moodsync.app"]
        );
        assert_eq!(parse_origins("*"), vec!["*"]);
    }
}
