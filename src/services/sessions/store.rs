//! Pluggable session storage.
use async_trait::async_trait;

use chrono::{DateTime, Utc};

use crate::error::AuthResult;
use crate::services::sessions::types::Session;

#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Insert `session`, first hard-deleting the user's oldest live sessions
    /// until fewer than `max_live` remain. The count-evict-insert sequence is
    /// atomic per user. Returns the evicted ids, oldest first.
    async fn insert_capped(
        &self,
        session: Session,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<String>>;

    async fn get(&self, id: &str) -> AuthResult<Option<Session>>;

    /// Overwrite an existing record.
    async fn put(&self, session: Session, now: DateTime<Utc>) -> AuthResult<()>;

    async fn delete(&self, id: &str) -> AuthResult<bool>;

    async fn list_for_user(&self, user_id: &str) -> AuthResult<Vec<Session>>;

    /// Drop every record whose `expires_at` has passed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<usize>;

    /// True when the backend drops expired records on its own.
    fn expires_natively(&self) -> bool;
}

/// Ids of the oldest live sessions to evict so that one more fits under `max_live`.
pub(crate) fn eviction_victims(
    sessions: &[Session],
    max_live: usize,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut live: Vec<&Session> = sessions.iter().filter(|s| s.is_live_at(now)).collect();
    live.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let excess = (live.len() + 1).saturating_sub(max_live.max(1));
    live.into_iter().take(excess).map(|s| s.id.clone()).collect()
}
