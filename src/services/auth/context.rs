//! The normalized result of authenticating any credential kind.
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Token,
    ApiKey,
    Session,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Token => "token",
            CredentialKind::ApiKey => "api_key",
            CredentialKind::Session => "session",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the caller is and what the credential grants.
///
/// Built per request by a verifier and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub subject: String,
    pub tenant_id: Option<String>,
    pub scopes: Vec<String>,
    pub kind: CredentialKind,
    pub expires_at: Option<DateTime<Utc>>,
    /// jti, API key id or session id. Never the secret itself.
    pub credential_id: Option<String>,
}

impl AuthContext {
    pub fn new(subject: impl Into<String>, kind: CredentialKind) -> Self {
        Self {
            subject: subject.into(),
            tenant_id: None,
            scopes: Vec::new(),
            kind,
            expires_at: None,
            credential_id: None,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// A context without a tenant never matches a tenant-scoped check.
    pub fn in_tenant(&self, tenant_id: &str) -> bool {
        self.tenant_id.as_deref() == Some(tenant_id)
    }
}

/// Network facts about the call presenting a credential.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<IpAddr>,
    pub is_https: bool,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip: Option<IpAddr>, is_https: bool) -> Self {
        Self {
            ip,
            is_https,
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
