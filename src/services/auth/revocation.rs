//! Revocation markers for single tokens (by jti) and whole subjects.
//!
//! Markers live in the shared cache so a revoke on one instance is seen by all.
//! Each marker expires after the longest token lifetime plus leeway, by which
//! point every token it could reject has expired anyway.
use async_trait::async_trait;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AuthError, AuthResult};
use crate::services::cache::{CacheClient, CacheError};

#[async_trait]
pub trait RevocationStore: Send + Sync + std::fmt::Debug {
    async fn revoke_token(&self, jti: &str) -> AuthResult<()>;

    async fn is_token_revoked(&self, jti: &str) -> AuthResult<bool>;

    /// Reject every token for `subject` issued at or before `at`.
    async fn revoke_subject(&self, subject: &str, at: DateTime<Utc>) -> AuthResult<()>;

    /// Epoch seconds of the latest subject-wide revocation, if any.
    async fn subject_revoked_at(&self, subject: &str) -> AuthResult<Option<i64>>;
}

#[derive(Debug, Clone)]
pub struct CacheRevocationStore<C: CacheClient> {
    cache: C,
    prefix: String,
    ttl: Duration,
}

impl<C: CacheClient> CacheRevocationStore<C> {
    pub fn new(cache: C, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn jti_key(&self, jti: &str) -> String {
        format!("{}:revoked:jti:{}", self.prefix, jti)
    }

    fn subject_key(&self, subject: &str) -> String {
        format!("{}:revoked:sub:{}", self.prefix, subject)
    }
}

#[async_trait]
impl<C: CacheClient + std::fmt::Debug> RevocationStore for CacheRevocationStore<C> {
    async fn revoke_token(&self, jti: &str) -> AuthResult<()> {
        self.cache
            .set_with_ttl(&self.jti_key(jti), "1", self.ttl)
            .await?;
        Ok(())
    }

    async fn is_token_revoked(&self, jti: &str) -> AuthResult<bool> {
        Ok(self.cache.get_string(&self.jti_key(jti)).await?.is_some())
    }

    // An existing later cutoff is kept; the update is atomic in the backend.
    async fn revoke_subject(&self, subject: &str, at: DateTime<Utc>) -> AuthResult<()> {
        self.cache
            .set_max_with_ttl(&self.subject_key(subject), at.timestamp(), self.ttl)
            .await?;
        Ok(())
    }

    async fn subject_revoked_at(&self, subject: &str) -> AuthResult<Option<i64>> {
        let Some(raw) = self.cache.get_string(&self.subject_key(subject)).await? else {
            return Ok(None);
        };

        raw.parse::<i64>().map(Some).map_err(|_| {
            AuthError::StoreUnavailable(CacheError::InvalidValue(format!(
                "revocation cutoff is not a timestamp: {raw}"
            )))
        })
    }
}
