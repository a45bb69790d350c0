//! Key-value interface shared by revocation, rate limiting and session storage.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization/timeout).
///
/// Note:
/// - Kept independent from `AuthError` so each caller decides how to fail.
///   Every caller in this crate fails closed.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
    #[error("cache operation timed out")]
    Timeout,
}

/// A small string-based key-value interface.
///
/// - `get`, `set` with TTL, `SET NX` and `DEL` for revocation markers and locks.
/// - `incr_with_ttl` is the atomic increment used by the rate limiter.
/// - `set_max_with_ttl` keeps a monotonic timestamp (subject revocation cutoffs).
/// - Set operations back the per-user session index.
///
/// Implementations must be cheap to clone (typically `Arc<...>` inside).
#[async_trait]
pub trait CacheClient: Clone + Send + Sync + 'static {
    // Returns the cache backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    // Set value if the key does not exist, with TTL.
    //
    // Returns:
    // - `Ok(true)`  if the key was set (not seen before)
    // - `Ok(false)` if the key already exists
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool>;

    // Atomically increment the counter at `key` and (re)arm its TTL.
    // Returns the value after the increment; a missing key counts from zero.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64>;

    // Atomically store `max(current, value)` at `key` and (re)arm its TTL.
    // Returns the value now stored.
    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> CacheResult<i64>;

    // Delete a key. Returns number of deleted keys.
    async fn del(&self, key: &str) -> CacheResult<u64>;

    // Add `member` to the set at `key`. The set's TTL is raised to `ttl` if
    // that is longer than what remains; it is never shortened.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()>;

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;
}

/// Convenience helper to build a TTL from seconds.
pub fn ttl_seconds(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}
