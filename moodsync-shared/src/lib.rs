//! # MoodSync Shared Library
//!
//! This crate contains shared types, utilities, and business logic used by
//! the MoodSync API server and maintenance worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and data structures
//! - `auth`: Authentication utilities (passwords, JWT, request context)
//! - `billing`: Stripe integration and subscription reconciliation
//! - `db`: Connection pool and migrations
//! - `redis`: Redis client used for rate limiting

pub mod auth;
pub mod billing;
pub mod db;
pub mod models;
pub mod redis;

/// Current version of the MoodSync shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
