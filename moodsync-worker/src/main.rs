//! # MoodSync Worker
//!
//! Background maintenance process. Runs next to the API against the same
//! database and owns no HTTP surface.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p moodsync-worker
//! ```

use std::sync::Arc;

use moodsync_shared::db::pool::{close_pool, create_pool};
use moodsync_worker::config::WorkerConfig;
use moodsync_worker::jobs::{PremiumExpiryJob, ReferralExpiryJob, WebhookLedgerPruneJob};
use moodsync_worker::scheduler::Scheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodsync_worker=debug,moodsync_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("MoodSync Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(config.database.clone()).await?;
    tracing::info!("Database connection established");

    let mut scheduler = Scheduler::new();
    scheduler.add(
        Arc::new(ReferralExpiryJob::new(pool.clone())),
        config.referral_interval,
    );
    scheduler.add(
        Arc::new(PremiumExpiryJob::new(pool.clone())),
        config.premium_interval,
    );
    scheduler.add(
        Arc::new(WebhookLedgerPruneJob::new(
            pool.clone(),
            config.ledger_retention(),
        )),
        config.ledger_prune_interval,
    );

    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    scheduler.run().await;

    close_pool(pool).await;
    tracing::info!("Worker shut down");

    Ok(())
}
