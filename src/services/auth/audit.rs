//! Sink for authentication failures.
//!
//! Events carry the credential kind, a failure reason and the caller's network
//! context. The raw secret is never part of an event; `credential_hint` holds at
//! most a key prefix, key id or jti.
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::services::auth::context::{CredentialKind, RequestContext};

#[derive(Debug, Clone)]
pub struct AuthFailureEvent {
    pub kind: CredentialKind,
    pub reason: String,
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub credential_hint: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuthFailureEvent {
    pub fn new(
        kind: CredentialKind,
        reason: impl Into<String>,
        request: &RequestContext,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            reason: reason.into(),
            ip: request.ip,
            user_agent: request.user_agent.clone(),
            credential_hint: None,
            occurred_at,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.credential_hint = Some(hint.into());
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    async fn record_failure(&self, event: AuthFailureEvent);
}

/// Writes failures to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record_failure(&self, event: AuthFailureEvent) {
        tracing::warn!(
            target: "audit",
            kind = %event.kind,
            reason = %event.reason,
            ip = ?event.ip,
            user_agent = ?event.user_agent,
            credential = ?event.credential_hint,
            at = %event.occurred_at,
            "authentication failure"
        );
    }
}

/// Keeps every event in memory. For tests and local inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuthFailureEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthFailureEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record_failure(&self, event: AuthFailureEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
