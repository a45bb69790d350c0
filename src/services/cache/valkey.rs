use async_trait::async_trait;
use std::time::Duration;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

/// Valkey/Redis-backed cache client.
///
/// Shared across every process serving the platform, so revocations, rate-limit
/// windows and sessions are consistent cluster-wide.
#[derive(Clone)]
pub struct ValkeyClient {
    manager: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for ValkeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyClient").finish_non_exhaustive()
    }
}

impl ValkeyClient {
    // Create a Valkey client from a URL like `redis://localhost:6379`
    pub async fn new(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        Ok(Self { manager })
    }
}

// EX expects integer seconds. We clamp to at least 1 sec.
fn ex_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

const SET_MAX_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]))
local value = tonumber(ARGV[1])
if current ~= nil and current > value then
    value = current
end
redis.call('SET', KEYS[1], value, 'EX', ARGV[2])
return value
"#;

fn command_error(e: redis::RedisError) -> CacheError {
    CacheError::BackendCommand(e.to_string())
}

#[async_trait]
impl CacheClient for ValkeyClient {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        // Use a clone of the connection manager
        let mut conn = self.manager.clone();

        let resp: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(resp)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ex_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        // Redis/Valkey: `SET key value NX EX <seconds>`
        // returns:
        // - `OK` if set
        // - Nil if not set
        let mut conn = self.manager.clone();

        let resp: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ex_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(resp.is_some())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        let mut conn = self.manager.clone();

        // MULTI/EXEC: INCR and EXPIRE land together, so a counter never outlives its window.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ex_seconds(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(count)
    }

    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.manager.clone();

        // Read-compare-write runs server-side so concurrent callers cannot lower it.
        let stored: i64 = redis::cmd("EVAL")
            .arg(SET_MAX_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(value)
            .arg(ex_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(stored)
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.manager.clone();

        // DEL returns number of keys removed (0 or 1 for a single key).
        let n: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(n)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .ignore()
            // NX arms a fresh set, GT only ever lengthens an existing one.
            .cmd("EXPIRE")
            .arg(key)
            .arg(ex_seconds(ttl))
            .arg("NX")
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ex_seconds(ttl))
            .arg("GT")
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        let _: u64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.manager.clone();

        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(members)
    }
}
