//! # MoodSync API Server Library
//!
//! HTTP surface of the MoodSync backend: Stripe webhook reconciliation,
//! billing, and the user-facing CRUD endpoints.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers and rate limiting
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
