//! Session store on top of the shared cache.
//!
//! Layout:
//! - `{prefix}:session:{id}`: JSON record, TTL follows `expires_at`
//! - `{prefix}:session:user:{user_id}`: set of the user's session ids; its TTL
//!   only ever grows, so it outlives the user's longest-lived session
//! - `{prefix}:session:lock:{user_id}`: short `SET NX` lock around cap enforcement
use async_trait::async_trait;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{AuthError, AuthResult};
use crate::services::auth::codec::random_token;
use crate::services::cache::{CacheClient, CacheError};
use crate::services::sessions::store::{SessionStore, eviction_victims};
use crate::services::sessions::types::Session;

const LOCK_TTL: Duration = Duration::from_secs(5);
const LOCK_ATTEMPTS: u32 = 20;
const LOCK_BACKOFF: Duration = Duration::from_millis(10);

/// Records outlive `expires_at` by this much so the manager, not the backend,
/// observes and reports the expiry.
const EXPIRY_GRACE_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct CacheSessionStore<C: CacheClient> {
    cache: C,
    prefix: String,
}

impl<C: CacheClient + std::fmt::Debug> CacheSessionStore<C> {
    pub fn new(cache: C, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    fn session_key(&self, id: &str) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    fn user_key(&self, user_id: &str) -> String {
        format!("{}:session:user:{}", self.prefix, user_id)
    }

    fn lock_key(&self, user_id: &str) -> String {
        format!("{}:session:lock:{}", self.prefix, user_id)
    }

    fn ttl_for(session: &Session, now: DateTime<Utc>) -> Duration {
        let secs = (session.expires_at - now).num_seconds() + EXPIRY_GRACE_SECONDS;
        Duration::from_secs(u64::try_from(secs).unwrap_or(0).max(1))
    }

    async fn write(&self, session: &Session, now: DateTime<Utc>) -> AuthResult<()> {
        let json = serde_json::to_string(session)
            .map_err(|e| CacheError::InvalidValue(e.to_string()))?;
        let ttl = Self::ttl_for(session, now);
        self.cache
            .set_with_ttl(&self.session_key(&session.id), &json, ttl)
            .await?;
        self.cache
            .set_add(&self.user_key(&session.user_id), &session.id, ttl)
            .await?;
        Ok(())
    }

    async fn read(&self, id: &str) -> AuthResult<Option<Session>> {
        let Some(raw) = self.cache.get_string(&self.session_key(id)).await? else {
            return Ok(None);
        };
        let session = serde_json::from_str::<Session>(&raw)
            .map_err(|e| CacheError::InvalidValue(e.to_string()))?;
        Ok(Some(session))
    }

    async fn remove(&self, session: &Session) -> AuthResult<bool> {
        let removed = self.cache.del(&self.session_key(&session.id)).await? > 0;
        self.cache
            .set_remove(&self.user_key(&session.user_id), &session.id)
            .await?;
        Ok(removed)
    }

    async fn acquire(&self, user_id: &str) -> AuthResult<(String, String)> {
        let key = self.lock_key(user_id);
        let token = random_token(16)?;
        for _ in 0..LOCK_ATTEMPTS {
            if self.cache.set_if_absent_with_ttl(&key, &token, LOCK_TTL).await? {
                return Ok((key, token));
            }
            tokio::time::sleep(LOCK_BACKOFF).await;
        }
        warn!(user_id = %user_id, "session cap lock not acquired");
        Err(AuthError::StoreUnavailable(CacheError::Timeout))
    }

    async fn release(&self, key: &str, token: &str) {
        // Only drop the lock if it is still ours; it may have expired and been re-taken.
        match self.cache.get_string(key).await {
            Ok(Some(current)) if current == token => {
                if let Err(e) = self.cache.del(key).await {
                    warn!(error = %e, "failed to release session lock");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read session lock"),
        }
    }

    async fn insert_locked(
        &self,
        session: &Session,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<String>> {
        let existing = self.list_for_user(&session.user_id).await?;
        let victims = eviction_victims(&existing, max_live, now);
        for victim in existing.iter().filter(|s| victims.contains(&s.id)) {
            self.remove(victim).await?;
        }
        self.write(session, now).await?;
        Ok(victims)
    }
}

#[async_trait]
impl<C: CacheClient + std::fmt::Debug> SessionStore for CacheSessionStore<C> {
    async fn insert_capped(
        &self,
        session: Session,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<String>> {
        let (lock_key, token) = self.acquire(&session.user_id).await?;
        let result = self.insert_locked(&session, max_live, now).await;
        self.release(&lock_key, &token).await;
        result
    }

    async fn get(&self, id: &str) -> AuthResult<Option<Session>> {
        self.read(id).await
    }

    async fn put(&self, session: Session, now: DateTime<Utc>) -> AuthResult<()> {
        if self.read(&session.id).await?.is_none() {
            return Err(AuthError::NotFound("session"));
        }
        self.write(&session, now).await
    }

    async fn delete(&self, id: &str) -> AuthResult<bool> {
        match self.read(id).await? {
            Some(session) => self.remove(&session).await,
            None => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let user_key = self.user_key(user_id);
        let mut sessions = Vec::new();
        for id in self.cache.set_members(&user_key).await? {
            match self.read(&id).await? {
                Some(session) => sessions.push(session),
                // Record expired in the backend; prune the index entry.
                None => self.cache.set_remove(&user_key, &id).await?,
            }
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> AuthResult<usize> {
        Ok(0)
    }

    // Every record carries a backend TTL.
    fn expires_natively(&self) -> bool {
        true
    }
}
