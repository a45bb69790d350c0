use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

/// Bounds every backend call with a timeout.
///
/// Idempotent operations get a single retry; increments never do, a timed-out
/// `INCR` may already have been applied. After that the error is returned and
/// the caller fails closed.
#[derive(Clone, Debug)]
pub struct GuardedCache<C: CacheClient> {
    inner: C,
    timeout: Duration,
}

impl<C: CacheClient> GuardedCache<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn once<T, Fut>(&self, op: &'static str, fut: Fut) -> CacheResult<T>
    where
        Fut: Future<Output = CacheResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(backend = self.inner.backend_name(), op, "cache call timed out");
                Err(CacheError::Timeout)
            }
        }
    }

    async fn retry_once<T, F, Fut>(&self, op: &'static str, mut call: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        match self.once(op, call()).await {
            Ok(v) => Ok(v),
            Err(first) => {
                warn!(backend = self.inner.backend_name(), op, error = %first, "retrying cache call");
                self.once(op, call()).await
            }
        }
    }
}

#[async_trait]
impl<C: CacheClient> CacheClient for GuardedCache<C> {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        self.retry_once("get", || self.inner.get_string(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.retry_once("set", || self.inner.set_with_ttl(key, value, ttl))
            .await
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        self.once("set_nx", self.inner.set_if_absent_with_ttl(key, value, ttl))
            .await
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        self.once("incr", self.inner.incr_with_ttl(key, ttl)).await
    }

    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> CacheResult<i64> {
        self.retry_once("set_max", || self.inner.set_max_with_ttl(key, value, ttl))
            .await
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        self.retry_once("del", || self.inner.del(key)).await
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        self.retry_once("sadd", || self.inner.set_add(key, member, ttl))
            .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()> {
        self.retry_once("srem", || self.inner.set_remove(key, member))
            .await
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.retry_once("smembers", || self.inner.set_members(key))
            .await
    }
}
