/// Interval scheduler for maintenance jobs
///
/// Every job gets its own Tokio task and ticks on its own interval. The first
/// run happens immediately. A failed run is logged and the job stays
/// scheduled; the next tick tries again.
///
/// # Shutdown
///
/// Cancelling the scheduler's token stops all loops. A run already in
/// progress finishes before its loop exits.
///
/// # Example
///
/// ```no_run
/// use moodsync_worker::jobs::ReferralExpiryJob;
/// use moodsync_worker::scheduler::Scheduler;
/// use sqlx::PgPool;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example(pool: PgPool) {
/// let mut scheduler = Scheduler::new();
/// scheduler.add(Arc::new(ReferralExpiryJob::new(pool)), Duration::from_secs(3600));
///
/// let shutdown = scheduler.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
///
/// scheduler.run().await;
/// # }
/// ```

use crate::jobs::MaintenanceJob;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

struct ScheduledJob {
    job: Arc<dyn MaintenanceJob>,
    interval: Duration,
}

pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    shutdown_token: CancellationToken,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            jobs: Vec::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Registers a job to run every `interval`
    pub fn add(&mut self, job: Arc<dyn MaintenanceJob>, interval: Duration) {
        tracing::info!(job = job.name(), interval_secs = interval.as_secs(), "Registering job");
        self.jobs.push(ScheduledJob { job, interval });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Token that stops the scheduler when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs all jobs until the shutdown token is cancelled
    pub async fn run(self) {
        let Scheduler {
            jobs,
            shutdown_token,
        } = self;
        tracing::info!(jobs = jobs.len(), "Scheduler starting");

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|scheduled| tokio::spawn(job_loop(scheduled, shutdown_token.clone())))
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job loop panicked");
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

async fn job_loop(scheduled: ScheduledJob, shutdown: CancellationToken) {
    let ScheduledJob { job, interval } = scheduled;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = tokio::time::Instant::now();
        match job.run(chrono::Utc::now()).await {
            Ok(report) => tracing::debug!(
                job = job.name(),
                affected = report.affected,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            ),
            Err(e) => tracing::error!(job = job.name(), error = %e, "Job failed"),
        }
    }

    tracing::debug!(job = job.name(), "Job loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobError, JobReport};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingJob {
        runs: AtomicU64,
        fail: bool,
    }

    impl CountingJob {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(CountingJob {
                runs: AtomicU64::new(0),
                fail,
            })
        }

        fn runs(&self) -> u64 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MaintenanceJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _now: DateTime<Utc>) -> Result<JobReport, JobError> {
            let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(JobError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(JobReport::new(runs))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval_until_cancelled() {
        let job = CountingJob::new(false);
        let mut scheduler = Scheduler::new();
        scheduler.add(job.clone(), Duration::from_secs(60));
        let shutdown = scheduler.shutdown_token();

        let handle = tokio::spawn(scheduler.run());

        // Ticks at 0s, 60s and 120s
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(job.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_stays_scheduled() {
        let job = CountingJob::new(true);
        let mut scheduler = Scheduler::new();
        scheduler.add(job.clone(), Duration::from_secs(10));
        let shutdown = scheduler.shutdown_token();

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(job.runs(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_independently() {
        let fast = CountingJob::new(false);
        let slow = CountingJob::new(false);
        let mut scheduler = Scheduler::new();
        scheduler.add(fast.clone(), Duration::from_secs(5));
        scheduler.add(slow.clone(), Duration::from_secs(60));
        assert_eq!(scheduler.len(), 2);
        let shutdown = scheduler.shutdown_token();

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(32)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(fast.runs(), 7);
        assert_eq!(slow.runs(), 1);
    }

    #[tokio::test]
    async fn test_empty_scheduler_returns() {
        let scheduler = Scheduler::new();
        assert!(scheduler.is_empty());
        scheduler.run().await;
    }
}
