use async_trait::async_trait;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{AuthError, AuthResult};
use crate::services::auth::audit::{AuditSink, AuthFailureEvent, TracingAuditSink};
use crate::services::auth::codec::random_token;
use crate::services::auth::context::{AuthContext, CredentialKind, RequestContext};
use crate::services::auth::registry::CredentialVerifier;
use crate::services::clock::{Clock, SystemClock};
use crate::services::sessions::store::SessionStore;
use crate::services::sessions::types::{NewSession, Session, SessionStatus};

/// Session id entropy in bytes.
const SESSION_ID_BYTES: usize = 32;

/// Session lifecycle over a pluggable `SessionStore`.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn seconds(value: u64) -> AuthResult<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| AuthError::validation("duration is too large"))
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Evicts the user's oldest live sessions first when the cap is reached.
    pub async fn create_session(&self, new: NewSession) -> AuthResult<Session> {
        if new.user_id.trim().is_empty() {
            return Err(AuthError::validation("user_id must not be empty"));
        }
        let ttl = new.ttl_seconds.unwrap_or(self.config.ttl_seconds);
        if ttl == 0 {
            return Err(AuthError::validation("session ttl must be positive"));
        }

        let now = self.clock.now();
        let session = Session {
            id: random_token(SESSION_ID_BYTES)?,
            user_id: new.user_id,
            tenant_id: new.tenant_id,
            created_at: now,
            last_accessed: now,
            expires_at: now + seconds(ttl)?,
            status: SessionStatus::Active,
            metadata: new.metadata,
        };

        let evicted = self
            .store
            .insert_capped(session.clone(), self.config.max_per_user, now)
            .await?;
        if !evicted.is_empty() {
            info!(user_id = %session.user_id, evicted = evicted.len(), "evicted oldest sessions");
        }
        debug!(user_id = %session.user_id, "session created");
        Ok(session)
    }

    /// Expired records are deleted instead of returned. A live active read
    /// slides `last_accessed`; `expires_at` is untouched.
    pub async fn get_session(&self, session_id: &str) -> AuthResult<Option<Session>> {
        let Some(mut session) = self.store.get(session_id).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if session.is_expired_at(now) {
            self.store.delete(session_id).await?;
            debug!(user_id = %session.user_id, "expired session removed on read");
            return Ok(None);
        }

        if session.status == SessionStatus::Active {
            session.last_accessed = now;
            self.store.put(session.clone(), now).await?;
        }
        Ok(Some(session))
    }

    /// Marks the session invalidated and keeps the record.
    pub async fn invalidate_session(&self, session_id: &str) -> AuthResult<bool> {
        let Some(mut session) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        if session.status == SessionStatus::Invalidated {
            return Ok(true);
        }
        session.status = SessionStatus::Invalidated;
        self.store.put(session.clone(), self.clock.now()).await?;
        info!(user_id = %session.user_id, "session invalidated");
        Ok(true)
    }

    pub async fn delete_session(&self, session_id: &str) -> AuthResult<bool> {
        self.store.delete(session_id).await
    }

    /// Logout everywhere, optionally keeping one session.
    pub async fn invalidate_user_sessions(
        &self,
        user_id: &str,
        exclude_session: Option<&str>,
    ) -> AuthResult<usize> {
        let now = self.clock.now();
        let mut count = 0;
        for mut session in self.store.list_for_user(user_id).await? {
            if Some(session.id.as_str()) == exclude_session
                || session.status != SessionStatus::Active
            {
                continue;
            }
            session.status = SessionStatus::Invalidated;
            self.store.put(session, now).await?;
            count += 1;
        }
        info!(user_id = %user_id, count, "user sessions invalidated");
        Ok(count)
    }

    /// The only way `expires_at` moves forward.
    pub async fn extend_session(
        &self,
        session_id: &str,
        additional_seconds: u64,
    ) -> AuthResult<Session> {
        let now = self.clock.now();
        let mut session = self
            .store
            .get(session_id)
            .await?
            .filter(|s| !s.is_expired_at(now))
            .ok_or(AuthError::NotFound("session"))?;
        if session.status != SessionStatus::Active {
            return Err(AuthError::validation("only active sessions can be extended"));
        }

        session.expires_at += seconds(additional_seconds)?;
        self.store.put(session.clone(), now).await?;
        debug!(user_id = %session.user_id, "session extended");
        Ok(session)
    }

    /// Sweep for stores that do not expire records themselves. No-op otherwise.
    pub async fn cleanup_expired_sessions(&self) -> AuthResult<usize> {
        if self.store.expires_natively() {
            return Ok(0);
        }
        let purged = self.store.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            info!(purged, "expired sessions purged");
        }
        Ok(purged)
    }

    pub async fn list_user_sessions(&self, user_id: &str) -> AuthResult<Vec<Session>> {
        let mut sessions = self.store.list_for_user(user_id).await?;
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    async fn authenticate_unaudited(&self, session_id: &str) -> AuthResult<AuthContext> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or(AuthError::Authentication("session not found or expired"))?;

        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Invalidated => {
                return Err(AuthError::Authentication("session has been invalidated"));
            }
            SessionStatus::Expired => {
                return Err(AuthError::Authentication("session not found or expired"));
            }
        }

        Ok(AuthContext {
            scopes: session.scopes(),
            subject: session.user_id,
            tenant_id: session.tenant_id,
            kind: CredentialKind::Session,
            expires_at: Some(session.expires_at),
            credential_id: None,
        })
    }

    /// Active session id to `AuthContext`.
    pub async fn authenticate(
        &self,
        session_id: &str,
        request: &RequestContext,
    ) -> AuthResult<AuthContext> {
        match self.authenticate_unaudited(session_id).await {
            Ok(ctx) => Ok(ctx),
            Err(err) => {
                let event = AuthFailureEvent::new(
                    CredentialKind::Session,
                    err.to_string(),
                    request,
                    self.clock.now(),
                );
                self.audit.record_failure(event).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl CredentialVerifier for SessionManager {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Session
    }

    async fn authenticate(
        &self,
        credential: &str,
        request: &RequestContext,
    ) -> AuthResult<AuthContext> {
        SessionManager::authenticate(self, credential, request).await
    }
}
