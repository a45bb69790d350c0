/// Factory: build the credential services from application `Config`.
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, SigningConfig};
use crate::error::{AuthError, AuthResult};
use crate::services::api_keys::{ApiKeyService, FixedWindowLimiter, MemoryApiKeyStore};
use crate::services::auth::audit::{AuditSink, TracingAuditSink};
use crate::services::auth::codec::{SigningKeys, parse_algorithm};
use crate::services::auth::registry::VerifierRegistry;
use crate::services::auth::revocation::CacheRevocationStore;
use crate::services::auth::token_service::TokenService;
use crate::services::cache::{CacheClient, GuardedCache, MemoryCache, ValkeyClient};
use crate::services::clock::{Clock, SystemClock};
use crate::services::rbac::{MemoryPolicyStore, RbacEngine};
use crate::services::sessions::{CacheSessionStore, MemorySessionStore, SessionManager, SessionStore};

/// Every service the HTTP layer needs, wired to one shared backend.
#[derive(Debug, Clone)]
pub struct AuthCore {
    pub tokens: Arc<TokenService>,
    pub api_keys: Arc<ApiKeyService>,
    pub sessions: Arc<SessionManager>,
    pub rbac: Arc<RbacEngine>,
    pub verifiers: VerifierRegistry,
}

pub fn build_signing_keys(signing: &SigningConfig) -> AuthResult<SigningKeys> {
    let algorithm = parse_algorithm(&signing.algorithm)?;
    if signing.algorithm.trim().to_ascii_uppercase().starts_with("HS") {
        let secret = signing
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::configuration("JWT_SECRET is required for HMAC signing"))?;
        SigningKeys::hmac(algorithm, secret.as_bytes())
    } else {
        SigningKeys::rsa(
            algorithm,
            signing.private_key_pem.as_deref(),
            signing.public_key_pem.as_deref(),
        )
    }
}

/// Valkey when `VALKEY_URL` is set, process-local stores otherwise.
pub async fn build_auth_core(config: &Config) -> AuthResult<AuthCore> {
    let keys = build_signing_keys(&config.signing)?;
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match config.store.valkey_url.as_deref() {
        Some(url) => {
            let client = ValkeyClient::new(url).await?;
            let cache = GuardedCache::new(client, config.store.timeout);
            info!(backend = cache.backend_name(), "credential stores ready");
            let sessions = CacheSessionStore::new(cache.clone(), config.store.key_prefix.clone());
            Ok(assemble(cache, Arc::new(sessions), keys, config, audit, clock))
        }
        None => {
            let cache = GuardedCache::new(MemoryCache::new(), config.store.timeout);
            info!(backend = cache.backend_name(), "credential stores are process-local");
            Ok(assemble(
                cache,
                Arc::new(MemorySessionStore::new()),
                keys,
                config,
                audit,
                clock,
            ))
        }
    }
}

/// Wire the services over an already-built cache and session store.
pub fn assemble<C: CacheClient + std::fmt::Debug>(
    cache: C,
    session_store: Arc<dyn SessionStore>,
    keys: SigningKeys,
    config: &Config,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
) -> AuthCore {
    let prefix = config.store.key_prefix.clone();

    let revocations = CacheRevocationStore::new(
        cache.clone(),
        prefix.clone(),
        config.tokens.revocation_ttl(),
    );
    let tokens = Arc::new(
        TokenService::new(keys, config.tokens.clone(), Arc::new(revocations))
            .with_audit(audit.clone())
            .with_clock(clock.clone()),
    );

    let api_keys = Arc::new(
        ApiKeyService::new(
            Arc::new(MemoryApiKeyStore::new()),
            Arc::new(FixedWindowLimiter::new(cache, prefix)),
            config.api_keys.clone(),
        )
        .with_audit(audit.clone())
        .with_clock(clock.clone()),
    );

    let sessions = Arc::new(
        SessionManager::new(session_store, config.sessions.clone())
            .with_audit(audit)
            .with_clock(clock),
    );

    let rbac = Arc::new(RbacEngine::new(Arc::new(MemoryPolicyStore::new())));

    let verifiers = VerifierRegistry::new()
        .with(tokens.clone())
        .with(api_keys.clone())
        .with(sessions.clone());

    AuthCore {
        tokens,
        api_keys,
        sessions,
        rbac,
        verifiers,
    }
}
