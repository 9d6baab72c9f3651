/// Redis integration
///
/// - [`client`]: reconnecting connection wrapper with command timeouts
/// - [`rate_limiter`]: per-user token bucket backed by a Lua script

pub mod client;
pub mod rate_limiter;

pub use client::{RedisClient, RedisClientError, RedisConfig};
pub use rate_limiter::{RateLimit, RateLimitDecision, RateLimiter};
