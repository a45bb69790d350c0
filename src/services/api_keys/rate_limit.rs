//! Fixed-window request quota per API key.
//!
//! The counter for a window lives at `{prefix}:ratelimit:{key_id}:{window}:{start}`
//! and is bumped with one atomic increment, so concurrent requests can never
//! both consume the last unit of quota. A new window is simply a new key; old
//! counters expire on their own. Bursts of up to twice the quota across a window
//! edge are possible.
use async_trait::async_trait;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::services::api_keys::types::RateLimit;
use crate::services::cache::CacheClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Count one request. `RateLimited` once the window's quota is spent.
    async fn check(
        &self,
        key_id: &str,
        limit: &RateLimit,
        now: DateTime<Utc>,
    ) -> AuthResult<RateLimitDecision>;
}

#[derive(Debug, Clone)]
pub struct FixedWindowLimiter<C: CacheClient> {
    cache: C,
    prefix: String,
}

impl<C: CacheClient> FixedWindowLimiter<C> {
    pub fn new(cache: C, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    fn counter_key(&self, key_id: &str, limit: &RateLimit, start: DateTime<Utc>) -> String {
        format!(
            "{}:ratelimit:{}:{}:{}",
            self.prefix,
            key_id,
            limit.window,
            start.timestamp()
        )
    }
}

#[async_trait]
impl<C: CacheClient + std::fmt::Debug> RateLimiter for FixedWindowLimiter<C> {
    async fn check(
        &self,
        key_id: &str,
        limit: &RateLimit,
        now: DateTime<Utc>,
    ) -> AuthResult<RateLimitDecision> {
        let start = limit.window.window_start(now);
        let reset_at = start + limit.window.length();
        let until_reset = u64::try_from((reset_at - now).num_seconds())
            .unwrap_or(0)
            .max(1);

        let count = self
            .cache
            .incr_with_ttl(
                &self.counter_key(key_id, limit, start),
                std::time::Duration::from_secs(until_reset + 1),
            )
            .await?;

        if count > limit.requests {
            debug!(key_id = %key_id, window = %limit.window, count, "rate limit exceeded");
            return Err(AuthError::RateLimited {
                limit: limit.requests,
                remaining: 0,
                retry_after_secs: until_reset,
            });
        }

        Ok(RateLimitDecision {
            limit: limit.requests,
            remaining: limit.requests - count,
            reset_at,
        })
    }
}
