/// Worker configuration
///
/// # Environment Variables
///
/// - `WORKER_REFERRAL_INTERVAL_SECS`: referral expiry sweep (default: 3600)
/// - `WORKER_PREMIUM_INTERVAL_SECS`: premium expiry sweep (default: 300)
/// - `WORKER_LEDGER_PRUNE_INTERVAL_SECS`: webhook ledger prune (default: 86400)
/// - `WORKER_LEDGER_RETENTION_DAYS`: ledger rows kept (default: 30)
/// - `DATABASE_*`: see [`moodsync_shared::db::pool::DatabaseConfig`]

use std::env;
use std::time::Duration;

use moodsync_shared::db::pool::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub referral_interval: Duration,
    pub premium_interval: Duration,
    pub ledger_prune_interval: Duration,
    pub ledger_retention_days: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            database: DatabaseConfig::default(),
            referral_interval: Duration::from_secs(3600),
            premium_interval: Duration::from_secs(300),
            ledger_prune_interval: Duration::from_secs(86400),
            ledger_retention_days: 30,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails when `DATABASE_URL` is missing or a value does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = WorkerConfig::default();

        Ok(WorkerConfig {
            database: DatabaseConfig::from_env()?,
            referral_interval: interval_var(
                "WORKER_REFERRAL_INTERVAL_SECS",
                defaults.referral_interval,
            )?,
            premium_interval: interval_var(
                "WORKER_PREMIUM_INTERVAL_SECS",
                defaults.premium_interval,
            )?,
            ledger_prune_interval: interval_var(
                "WORKER_LEDGER_PRUNE_INTERVAL_SECS",
                defaults.ledger_prune_interval,
            )?,
            ledger_retention_days: match env::var("WORKER_LEDGER_RETENTION_DAYS") {
                Ok(raw) => raw.parse::<i64>()?,
                Err(_) => defaults.ledger_retention_days,
            },
        })
    }

    pub fn ledger_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.ledger_retention_days)
    }
}

fn interval_var(name: &str, default: Duration) -> anyhow::Result<Duration> {
    parse_interval(name, env::var(name).ok().as_deref(), default)
}

fn parse_interval(name: &str, raw: Option<&str>, default: Duration) -> anyhow::Result<Duration> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let secs = raw.trim().parse::<u64>()?;
    if secs == 0 {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(Duration::from_secs(secs))
}
