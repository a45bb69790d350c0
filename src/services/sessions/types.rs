use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Invalidated,
}

/// Server-side session record.
///
/// `expires_at` only moves forward through an explicit extend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Counts toward the per-user cap.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired_at(now)
    }

    /// `metadata.scopes`, when it is an array of strings.
    pub fn scopes(&self) -> Vec<String> {
        self.metadata
            .get("scopes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Inputs to `create_session`.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub metadata: Map<String, Value>,
}

impl NewSession {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }
}
