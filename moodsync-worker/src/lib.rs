//! # MoodSync Worker Library
//!
//! Periodic maintenance for the MoodSync database: referral expiry, premium
//! expiry and pruning of the Stripe webhook ledger.
//!
//! ## Modules
//!
//! - `config`: Worker intervals and database settings
//! - `jobs`: The `MaintenanceJob` trait and its implementations
//! - `scheduler`: Runs jobs on their intervals until shutdown
//!
//! ## Example
//!
//! ```no_run
//! use moodsync_worker::jobs::{MaintenanceJob, PremiumExpiryJob};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) {
//! let job = PremiumExpiryJob::new(pool);
//! println!("Job: {}", job.name());
//! # }
//! ```

pub mod config;
pub mod jobs;
pub mod scheduler;
