use async_trait::async_trait;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ApiKeyConfig;
use crate::error::{AuthError, AuthResult};
use crate::services::api_keys::rate_limit::RateLimiter;
use crate::services::api_keys::scopes::first_unknown;
use crate::services::api_keys::store::ApiKeyStore;
use crate::services::api_keys::types::{
    ApiKey, ApiKeyStatus, ApiKeyUpdate, CreateApiKeyRequest, CreatedApiKey, IpRule, RateLimit,
    ip_allowed,
};
use crate::services::auth::audit::{AuditSink, AuthFailureEvent, TracingAuditSink};
use crate::services::auth::codec::{constant_time_eq, hash_secret, random_token};
use crate::services::auth::context::{AuthContext, CredentialKind, RequestContext};
use crate::services::auth::registry::CredentialVerifier;
use crate::services::clock::{Clock, SystemClock};

/// Raw key entropy in bytes.
const SECRET_BYTES: usize = 32;
/// Characters of the raw key kept in cleartext for display.
const DISPLAY_PREFIX_LEN: usize = 12;

const INVALID_KEY: &str = "Invalid API key";

/// Issues, authenticates and polices long-lived API keys.
#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
    limiter: Arc<dyn RateLimiter>,
    config: ApiKeyConfig,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ApiKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_rate_limit(limit: &RateLimit) -> AuthResult<()> {
    if limit.requests == 0 {
        return Err(AuthError::validation("rate limit must allow at least one request"));
    }
    Ok(())
}

fn validate_allowlist(entries: &[String]) -> AuthResult<()> {
    for entry in entries {
        entry.parse::<IpRule>().map_err(AuthError::Validation)?;
    }
    Ok(())
}

impl ApiKeyService {
    pub fn new(
        store: Arc<dyn ApiKeyStore>,
        limiter: Arc<dyn RateLimiter>,
        config: ApiKeyConfig,
    ) -> Self {
        Self {
            store,
            limiter,
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

    fn validate_scopes(&self, scopes: &[String]) -> AuthResult<()> {
        if scopes.is_empty() {
            return Err(AuthError::validation("at least one scope is required"));
        }
        if let Some(unknown) = first_unknown(scopes, &self.config.scopes) {
            return Err(AuthError::validation(format!("unknown scope: {unknown}")));
        }
        Ok(())
    }

    fn mint_secret(&self) -> AuthResult<(String, String, String)> {
        let secret = format!("{}_{}", self.config.prefix, random_token(SECRET_BYTES)?);
        let hash = hash_secret(&secret);
        let display: String = secret.chars().take(DISPLAY_PREFIX_LEN).collect();
        Ok((secret, hash, display))
    }

    pub async fn create_api_key(&self, request: CreateApiKeyRequest) -> AuthResult<CreatedApiKey> {
        if request.owner_id.trim().is_empty() {
            return Err(AuthError::validation("owner_id must not be empty"));
        }
        if request.name.trim().is_empty() {
            return Err(AuthError::validation("name must not be empty"));
        }
        self.validate_scopes(&request.scopes)?;
        let rate_limit = request.rate_limit.unwrap_or(self.config.default_rate_limit);
        validate_rate_limit(&rate_limit)?;
        let allowed_ips = request.allowed_ips.unwrap_or_default();
        validate_allowlist(&allowed_ips)?;

        let now = self.clock.now();
        let expires_at = match request.expires_in_days {
            Some(0) => return Err(AuthError::validation("expires_in_days must be positive")),
            Some(days) => Some(now + Duration::days(i64::from(days))),
            None => None,
        };

        let (secret, key_hash, prefix) = self.mint_secret()?;
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            owner_id: request.owner_id,
            tenant_id: request.tenant_id,
            name: request.name,
            key_hash,
            prefix,
            scopes: request.scopes,
            status: ApiKeyStatus::Active,
            allowed_ips,
            require_https: request.require_https,
            rate_limit,
            expires_at,
            total_requests: 0,
            failed_requests: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
            revoked_at: None,
        };

        self.store
            .insert_capped(key.clone(), self.config.max_active_per_owner, now)
            .await?;
        info!(key_id = %key.id, owner = %key.owner_id, prefix = %key.prefix, "api key created");

        Ok(CreatedApiKey { key, secret })
    }

    async fn fail(
        &self,
        request: &RequestContext,
        key: Option<&ApiKey>,
        err: AuthError,
    ) -> AuthError {
        let now = self.clock.now();
        let mut event = AuthFailureEvent::new(CredentialKind::ApiKey, err.to_string(), request, now);
        if let Some(key) = key {
            event = event.with_hint(key.prefix.clone());
            if let Err(e) = self.store.record_usage(&key.id, false, now).await {
                warn!(key_id = %key.id, error = %e, "failed to record api key failure");
            }
        }
        self.audit.record_failure(event).await;
        err
    }

    /// Every gate runs in order; the first failure is audited and returned.
    pub async fn authenticate_api_key(
        &self,
        raw_key: &str,
        request: &RequestContext,
    ) -> AuthResult<AuthContext> {
        let raw_key = raw_key.trim();
        let presented_hash = hash_secret(raw_key);

        // (1) lookup by hash
        let key = match self.store.find_by_hash(&presented_hash).await {
            Ok(Some(key)) if constant_time_eq(key.key_hash.as_bytes(), presented_hash.as_bytes()) => {
                key
            }
            Ok(_) => {
                return Err(self
                    .fail(request, None, AuthError::Authentication(INVALID_KEY))
                    .await);
            }
            Err(e) => return Err(self.fail(request, None, e).await),
        };

        let now = self.clock.now();

        // (2) status
        let status_error = match key.status {
            ApiKeyStatus::Active => None,
            ApiKeyStatus::Suspended => Some("API key is suspended"),
            ApiKeyStatus::Revoked => Some("API key has been revoked"),
            ApiKeyStatus::Expired => Some("API key has expired"),
        };
        if let Some(message) = status_error {
            return Err(self
                .fail(request, Some(&key), AuthError::Authentication(message))
                .await);
        }

        // (3) expiry
        if key.is_expired_at(now) {
            let mut expired = key.clone();
            expired.status = ApiKeyStatus::Expired;
            expired.updated_at = now;
            if let Err(e) = self.store.update(expired).await {
                warn!(key_id = %key.id, error = %e, "failed to mark api key expired");
            }
            return Err(self
                .fail(request, Some(&key), AuthError::Authentication("API key has expired"))
                .await);
        }

        // (4) IP allowlist
        if !ip_allowed(&key.allowed_ips, request.ip) {
            return Err(self
                .fail(request, Some(&key), AuthError::Authentication("IP address not allowed"))
                .await);
        }

        // (5) transport
        if key.require_https && !request.is_https {
            return Err(self
                .fail(request, Some(&key), AuthError::Authentication("HTTPS required"))
                .await);
        }

        // (6) quota
        if let Err(e) = self.limiter.check(&key.id, &key.rate_limit, now).await {
            return Err(self.fail(request, Some(&key), e).await);
        }

        if let Err(e) = self.store.record_usage(&key.id, true, now).await {
            warn!(key_id = %key.id, error = %e, "failed to record api key usage");
        }

        Ok(AuthContext {
            subject: key.owner_id,
            tenant_id: key.tenant_id,
            scopes: key.scopes,
            kind: CredentialKind::ApiKey,
            expires_at: key.expires_at,
            credential_id: Some(key.id),
        })
    }

    /// Scope containment, plus tenant equality when a tenant is given.
    pub fn check_permission(
        &self,
        ctx: &AuthContext,
        required_scope: &str,
        tenant_id: Option<&str>,
    ) -> bool {
        if !ctx.has_scope(required_scope) {
            return false;
        }
        match tenant_id {
            Some(tenant) => ctx.in_tenant(tenant),
            None => true,
        }
    }

    pub async fn get_api_key(&self, id: &str) -> AuthResult<ApiKey> {
        self.store
            .get(id)
            .await?
            .ok_or(AuthError::NotFound("API key"))
    }

    pub async fn list_api_keys(&self, owner_id: &str) -> AuthResult<Vec<ApiKey>> {
        self.store.list_by_owner(owner_id).await
    }

    async fn mutable_key(&self, id: &str) -> AuthResult<ApiKey> {
        let key = self.get_api_key(id).await?;
        if key.status == ApiKeyStatus::Revoked {
            return Err(AuthError::validation("API key has been revoked"));
        }
        Ok(key)
    }

    pub async fn update_api_key(&self, id: &str, update: ApiKeyUpdate) -> AuthResult<ApiKey> {
        let mut key = self.mutable_key(id).await?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(AuthError::validation("name must not be empty"));
            }
            key.name = name;
        }
        if let Some(scopes) = update.scopes {
            self.validate_scopes(&scopes)?;
            key.scopes = scopes;
        }
        if let Some(rate_limit) = update.rate_limit {
            validate_rate_limit(&rate_limit)?;
            key.rate_limit = rate_limit;
        }
        if let Some(allowed_ips) = update.allowed_ips {
            validate_allowlist(&allowed_ips)?;
            key.allowed_ips = allowed_ips;
        }
        if let Some(require_https) = update.require_https {
            key.require_https = require_https;
        }
        if let Some(expires_at) = update.expires_at {
            key.expires_at = expires_at;
            if key.status == ApiKeyStatus::Expired && !key.is_expired_at(self.clock.now()) {
                key.status = ApiKeyStatus::Active;
            }
        }

        key.updated_at = self.clock.now();
        self.store.update(key.clone()).await?;
        info!(key_id = %key.id, "api key updated");
        Ok(key)
    }

    pub async fn suspend_api_key(&self, id: &str) -> AuthResult<ApiKey> {
        let mut key = self.mutable_key(id).await?;
        if key.status == ApiKeyStatus::Suspended {
            return Ok(key);
        }
        key.status = ApiKeyStatus::Suspended;
        key.updated_at = self.clock.now();
        self.store.update(key.clone()).await?;
        info!(key_id = %key.id, "api key suspended");
        Ok(key)
    }

    /// Only a suspended key can be reactivated.
    pub async fn reactivate_api_key(&self, id: &str) -> AuthResult<ApiKey> {
        let mut key = self.get_api_key(id).await?;
        if key.status != ApiKeyStatus::Suspended {
            return Err(AuthError::validation(format!(
                "cannot reactivate a key that is {}",
                key.status.as_str()
            )));
        }
        key.status = ApiKeyStatus::Active;
        key.updated_at = self.clock.now();
        self.store.update(key.clone()).await?;
        info!(key_id = %key.id, "api key reactivated");
        Ok(key)
    }

    /// New secret, same settings; the old key is revoked afterwards.
    pub async fn rotate_api_key(&self, id: &str) -> AuthResult<CreatedApiKey> {
        let old = self.mutable_key(id).await?;
        let now = self.clock.now();
        let (secret, key_hash, prefix) = self.mint_secret()?;

        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            key_hash,
            prefix,
            status: ApiKeyStatus::Active,
            total_requests: 0,
            failed_requests: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
            revoked_at: None,
            ..old.clone()
        };

        // The replaced key still counts until it is revoked below.
        let cap = if old.is_active_at(now) {
            self.config.max_active_per_owner + 1
        } else {
            self.config.max_active_per_owner
        };
        self.store.insert_capped(key.clone(), cap, now).await?;
        self.revoke_api_key(&old.id).await?;
        info!(old_key_id = %old.id, key_id = %key.id, "api key rotated");

        Ok(CreatedApiKey { key, secret })
    }

    /// Terminal. Revoking twice is a no-op.
    pub async fn revoke_api_key(&self, id: &str) -> AuthResult<ApiKey> {
        let mut key = self.get_api_key(id).await?;
        if key.status == ApiKeyStatus::Revoked {
            return Ok(key);
        }
        let now: DateTime<Utc> = self.clock.now();
        key.status = ApiKeyStatus::Revoked;
        key.revoked_at = Some(now);
        key.updated_at = now;
        self.store.update(key.clone()).await?;
        info!(key_id = %key.id, "api key revoked");
        Ok(key)
    }
}

#[async_trait]
impl CredentialVerifier for ApiKeyService {
    fn kind(&self) -> CredentialKind {
        CredentialKind::ApiKey
    }

    async fn authenticate(
        &self,
        credential: &str,
        request: &RequestContext,
    ) -> AuthResult<AuthContext> {
        self.authenticate_api_key(credential, request).await
    }
}
