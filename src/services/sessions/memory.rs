use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{AuthError, AuthResult};
use crate::services::sessions::store::{SessionStore, eviction_victims};
use crate::services::sessions::types::Session;

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<String, Session>,
    by_user: HashMap<String, BTreeSet<String>>,
}

impl Tables {
    fn remove(&mut self, id: &str) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        if let Some(ids) = self.by_user.get_mut(&session.user_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_user.remove(&session.user_id);
            }
        }
        Some(session)
    }

    fn user_sessions(&self, user_id: &str) -> Vec<Session> {
        self.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.sessions.get(id).cloned())
            .collect()
    }
}

/// Process-local session store.
///
/// Nothing expires by itself; `cleanup_expired_sessions` must run periodically.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert_capped(
        &self,
        session: Session,
        max_live: usize,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<String>> {
        let mut tables = self.tables.lock().await;

        let victims = eviction_victims(&tables.user_sessions(&session.user_id), max_live, now);
        for id in &victims {
            tables.remove(id);
        }

        tables
            .by_user
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.id.clone());
        tables.sessions.insert(session.id.clone(), session);
        Ok(victims)
    }

    async fn get(&self, id: &str) -> AuthResult<Option<Session>> {
        Ok(self.tables.lock().await.sessions.get(id).cloned())
    }

    async fn put(&self, session: Session, _now: DateTime<Utc>) -> AuthResult<()> {
        let mut tables = self.tables.lock().await;
        let slot = tables
            .sessions
            .get_mut(&session.id)
            .ok_or(AuthError::NotFound("session"))?;
        *slot = session;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AuthResult<bool> {
        Ok(self.tables.lock().await.remove(id).is_some())
    }

    async fn list_for_user(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        Ok(self.tables.lock().await.user_sessions(user_id))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let mut tables = self.tables.lock().await;
        let expired: Vec<String> = tables
            .sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            tables.remove(id);
        }
        Ok(expired.len())
    }

    fn expires_natively(&self) -> bool {
        false
    }
}
