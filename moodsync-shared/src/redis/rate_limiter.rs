/// Redis token bucket rate limiter
///
/// One bucket per user under `ratelimit:user:{user_id}`. The refill and
/// consume step runs as a single Lua script, so concurrent requests from
/// several API instances see a consistent bucket. Idle buckets expire after
/// two minutes.
///
/// # Limits
///
/// - Free users: 60 requests/minute
/// - Premium users: 300 requests/minute

use std::time::{SystemTime, UNIX_EPOCH};

use redis::Script;
use uuid::Uuid;

use super::client::{RedisClient, RedisClientError};

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
redis.call('EXPIRE', key, 120)

local retry_after = 0
if allowed == 0 then
    retry_after = math.ceil((1 - tokens) / refill_rate)
end

return {allowed, math.floor(tokens), retry_after}
"#;

/// Bucket size and refill rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub requests_per_minute: u32,
}

impl RateLimit {
    pub const FREE: RateLimit = RateLimit {
        requests_per_minute: 60,
    };

    pub const PREMIUM: RateLimit = RateLimit {
        requests_per_minute: 300,
    };

    pub fn for_user(is_premium: bool) -> Self {
        if is_premium {
            Self::PREMIUM
        } else {
            Self::FREE
        }
    }

    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,

    /// Seconds until a token is available (0 when allowed)
    pub retry_after: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    client: RedisClient,
    script: Script,
}

impl RateLimiter {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }

    /// Consumes one token from the user's bucket
    pub async fn check(
        &self,
        user_id: Uuid,
        limit: RateLimit,
    ) -> Result<RateLimitDecision, RedisClientError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut conn = self.client.connection();
        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(bucket_key(user_id))
            .arg(limit.requests_per_minute)
            .arg(limit.refill_rate())
            .arg(now);

        let reply: Vec<i64> = self
            .client
            .with_timeout(invocation.invoke_async(&mut conn))
            .await?;

        decision_from_reply(&reply, limit)
    }
}

fn bucket_key(user_id: Uuid) -> String {
    format!("ratelimit:user:{}", user_id)
}

fn decision_from_reply(
    reply: &[i64],
    limit: RateLimit,
) -> Result<RateLimitDecision, RedisClientError> {
    match reply {
        [allowed, remaining, retry_after] => Ok(RateLimitDecision {
            allowed: *allowed == 1,
            limit: limit.requests_per_minute,
            remaining: (*remaining).max(0) as u32,
            retry_after: (*retry_after).max(0) as u64,
        }),
        other => Err(RedisClientError::CommandError(format!(
            "Unexpected rate limit reply: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_by_tier() {
        assert_eq!(RateLimit::for_user(false).requests_per_minute, 60);
        assert_eq!(RateLimit::for_user(true).requests_per_minute, 300);
        assert!((RateLimit::FREE.refill_rate() - 1.0).abs() < f64::EPSILON);
        assert!((RateLimit::PREMIUM.refill_rate() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bucket_key() {
        let id = Uuid::nil();
        assert_eq!(
            bucket_key(id),
            "ratelimit:user:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_decision_from_reply() {
        let allowed = decision_from_reply(&[1, 59, 0], RateLimit::FREE).unwrap();
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 59);
        assert_eq!(allowed.limit, 60);

        let blocked = decision_from_reply(&[0, 0, 1], RateLimit::FREE).unwrap();
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after, 1);

        assert!(decision_from_reply(&[1, 2], RateLimit::FREE).is_err());
    }
}
