//! Persistence boundary for API key records.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AuthError, AuthResult};
use crate::services::api_keys::types::ApiKey;

#[async_trait]
pub trait ApiKeyStore: Send + Sync + std::fmt::Debug {
    /// Insert unless the owner already holds `max_active` active keys.
    /// Count and insert happen under one write so concurrent creates cannot
    /// both slip under the cap.
    async fn insert_capped(
        &self,
        key: ApiKey,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> AuthResult<()>;

    async fn get(&self, id: &str) -> AuthResult<Option<ApiKey>>;

    async fn find_by_hash(&self, key_hash: &str) -> AuthResult<Option<ApiKey>>;

    async fn list_by_owner(&self, owner_id: &str) -> AuthResult<Vec<ApiKey>>;

    /// Replace an existing record. `NotFound` when the id is unknown.
    async fn update(&self, key: ApiKey) -> AuthResult<()>;

    /// Bump usage counters in place.
    async fn record_usage(&self, id: &str, success: bool, at: DateTime<Utc>) -> AuthResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<String, ApiKey>,
    id_by_hash: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryApiKeyStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn insert_capped(
        &self,
        key: ApiKey,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut tables = self.tables.write().await;

        let active = tables
            .by_id
            .values()
            .filter(|k| k.owner_id == key.owner_id && k.is_active_at(now))
            .count();
        if active >= max_active {
            return Err(AuthError::validation(format!(
                "maximum of {max_active} active API keys reached"
            )));
        }
        if tables.id_by_hash.contains_key(&key.key_hash) {
            return Err(AuthError::validation("API key collision, retry"));
        }

        tables
            .id_by_hash
            .insert(key.key_hash.clone(), key.id.clone());
        tables.by_id.insert(key.id.clone(), key);
        Ok(())
    }

    async fn get(&self, id: &str) -> AuthResult<Option<ApiKey>> {
        Ok(self.tables.read().await.by_id.get(id).cloned())
    }

    async fn find_by_hash(&self, key_hash: &str) -> AuthResult<Option<ApiKey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .id_by_hash
            .get(key_hash)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> AuthResult<Vec<ApiKey>> {
        let tables = self.tables.read().await;
        let mut keys: Vec<ApiKey> = tables
            .by_id
            .values()
            .filter(|k| k.owner_id == owner_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(keys)
    }

    async fn update(&self, key: ApiKey) -> AuthResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .by_id
            .get_mut(&key.id)
            .ok_or(AuthError::NotFound("API key"))?;
        *slot = key;
        Ok(())
    }

    async fn record_usage(&self, id: &str, success: bool, at: DateTime<Utc>) -> AuthResult<()> {
        let mut tables = self.tables.write().await;
        let key = tables
            .by_id
            .get_mut(id)
            .ok_or(AuthError::NotFound("API key"))?;

        key.total_requests += 1;
        if success {
            key.last_used_at = Some(at);
        } else {
            key.failed_requests += 1;
        }
        Ok(())
    }
}
