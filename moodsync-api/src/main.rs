//! # MoodSync API Server
//!
//! ```bash
//! cargo run -p moodsync-api
//! ```

use std::sync::Arc;

use anyhow::Context;
use moodsync_api::{
    app::{build_router, AppState},
    config::Config,
};
use moodsync_shared::{
    billing::{PgBillingStore, StripeClient, SubscriptionService},
    db::{migrations::run_migrations, pool},
    redis::{RateLimiter, RedisClient},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodsync_api=debug,moodsync_shared=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "MoodSync API server starting");

    let config = Config::from_env().context("Failed to load configuration")?;

    let db = pool::create_pool(config.database.clone())
        .await
        .context("Failed to connect to database")?;
    run_migrations(&db).await.context("Failed to run migrations")?;

    let rate_limiter = match config.redis.clone() {
        Some(redis_config) => match RedisClient::new(redis_config).await {
            Ok(client) => Some(RateLimiter::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, rate limiting disabled");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    let gateway = StripeClient::new(&config.stripe).context("Failed to build Stripe client")?;
    let billing = SubscriptionService::new(
        Arc::new(PgBillingStore::new(db.clone())),
        Arc::new(gateway),
        &config.stripe,
    );

    let bind_address = config.bind_address();
    let state = AppState::new(db.clone(), config, billing, rate_limiter);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool::close_pool(db).await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
