/// Middleware for the API server
///
/// - `security`: security response headers
/// - `rate_limit`: per-user Redis token bucket

pub mod rate_limit;
pub mod security;
