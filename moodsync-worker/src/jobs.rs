/// Maintenance jobs
///
/// Each job is one idempotent sweep over the database. Jobs take `now` as an
/// argument so a run is reproducible; the scheduler passes the wall clock.
///
/// # Jobs
///
/// - [`ReferralExpiryJob`]: pending/registered referrals past `expires_at` become `expired`
/// - [`PremiumExpiryJob`]: closes subscriptions canceled at period end, then
///   clears `is_premium` for users whose access has lapsed
/// - [`WebhookLedgerPruneJob`]: drops processed Stripe event ids older than
///   the retention window
///
/// # Example
///
/// ```no_run
/// use moodsync_worker::jobs::{MaintenanceJob, ReferralExpiryJob};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let job = ReferralExpiryJob::new(pool);
/// let report = job.run(chrono::Utc::now()).await?;
/// println!("{} referrals expired", report.affected);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moodsync_shared::models::premium_plan::PremiumPlan;
use moodsync_shared::models::referral::Referral;
use moodsync_shared::models::user::User;
use moodsync_shared::models::webhook_event::StripeWebhookEvent;
use sqlx::PgPool;

/// Job error types
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a single job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Rows changed by the run
    pub affected: u64,
}

impl JobReport {
    pub fn new(affected: u64) -> Self {
        JobReport { affected }
    }
}

/// A periodic maintenance sweep
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Runs one sweep as of `now`
    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, JobError>;
}

/// Expires referrals that were never converted
pub struct ReferralExpiryJob {
    db: PgPool,
}

impl ReferralExpiryJob {
    pub fn new(db: PgPool) -> Self {
        ReferralExpiryJob { db }
    }
}

#[async_trait]
impl MaintenanceJob for ReferralExpiryJob {
    fn name(&self) -> &'static str {
        "referral_expiry"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let expired = Referral::expire_stale(&self.db, now).await?;
        Ok(JobReport::new(expired))
    }
}

/// Revokes premium access whose paid period has ended
///
/// Webhooks normally do this, but a missed `customer.subscription.deleted`
/// would otherwise leave the flag set forever.
pub struct PremiumExpiryJob {
    db: PgPool,
}

impl PremiumExpiryJob {
    pub fn new(db: PgPool) -> Self {
        PremiumExpiryJob { db }
    }
}

#[async_trait]
impl MaintenanceJob for PremiumExpiryJob {
    fn name(&self) -> &'static str {
        "premium_expiry"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, JobError> {
        // Plans first, so a just-ended plan no longer covers its user below
        let closed = PremiumPlan::cancel_ended_periods(&self.db, now).await?;
        let revoked = User::expire_lapsed_premium(&self.db, now).await?;

        for user_id in &revoked {
            tracing::info!(user_id = %user_id, "Premium access expired");
        }

        Ok(JobReport::new((closed.len() + revoked.len()) as u64))
    }
}

/// Deletes old rows from the processed webhook ledger
pub struct WebhookLedgerPruneJob {
    db: PgPool,
    retention: Duration,
}

impl WebhookLedgerPruneJob {
    pub fn new(db: PgPool, retention: Duration) -> Self {
        WebhookLedgerPruneJob { db, retention }
    }

    /// Events processed before this instant are dropped
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }
}

#[async_trait]
impl MaintenanceJob for WebhookLedgerPruneJob {
    fn name(&self) -> &'static str {
        "webhook_ledger_prune"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<JobReport, JobError> {
        let pruned = StripeWebhookEvent::prune(&self.db, self.cutoff(now)).await?;
        Ok(JobReport::new(pruned))
    }
}
