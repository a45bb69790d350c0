use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult};
use crate::services::auth::audit::{AuditSink, AuthFailureEvent, TracingAuditSink};
use crate::services::auth::claims::{RESERVED_CLAIMS, TokenClaims, TokenType, join_scopes};
use crate::services::auth::codec::{SigningKeys, algorithm_name, peek_algorithm};
use crate::services::auth::context::{AuthContext, CredentialKind, RequestContext};
use crate::services::auth::registry::CredentialVerifier;
use crate::services::auth::revocation::RevocationStore;
use crate::services::clock::{Clock, SystemClock};

/// Optional inputs to `issue_access_token`. Unset fields fall back to the
/// service configuration.
#[derive(Debug, Clone, Default)]
pub struct AccessTokenOptions {
    pub scopes: Vec<String>,
    pub tenant_id: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub extra_claims: Map<String, Value>,
}

impl AccessTokenOptions {
    pub fn with_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
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

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub expected_type: Option<TokenType>,
    pub expected_audience: Option<String>,
    pub expected_issuer: Option<String>,
}

impl VerifyOptions {
    pub fn of_type(expected: TokenType) -> Self {
        Self {
            expected_type: Some(expected),
            ..Self::default()
        }
    }
}

/// Access + refresh tokens issued together.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

struct Mint<'a> {
    subject: &'a str,
    token_type: TokenType,
    tenant_id: Option<String>,
    scope: Option<String>,
    ttl_seconds: u64,
    issuer: Option<String>,
    audience: Option<String>,
    extra: Map<String, Value>,
}

/// Issues and verifies signed bearer tokens and owns their revocation state.
///
/// - Exactly one algorithm is accepted, the one the signing keys were built for.
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct TokenService {
    keys: SigningKeys,
    config: TokenConfig,
    revocations: Arc<dyn RevocationStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.keys.algorithm())
            .field("config", &self.config)
            .finish()
    }
}

impl TokenService {
    pub fn new(
        keys: SigningKeys,
        config: TokenConfig,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            keys,
            config,
            revocations,
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

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn access_token_ttl_seconds(&self) -> u64 {
        self.config.access_ttl_seconds
    }

    pub async fn issue_access_token(
        &self,
        subject: &str,
        options: AccessTokenOptions,
    ) -> AuthResult<String> {
        self.mint(Mint {
            subject,
            token_type: TokenType::Access,
            scope: join_scopes(&options.scopes),
            tenant_id: options.tenant_id,
            ttl_seconds: options.ttl_seconds.unwrap_or(self.config.access_ttl_seconds),
            issuer: options.issuer,
            audience: options.audience,
            extra: options.extra_claims,
        })
    }

    /// Refresh tokens never carry scopes.
    pub async fn issue_refresh_token(
        &self,
        subject: &str,
        tenant_id: Option<String>,
        ttl_seconds: Option<u64>,
    ) -> AuthResult<String> {
        self.mint(Mint {
            subject,
            token_type: TokenType::Refresh,
            tenant_id,
            scope: None,
            ttl_seconds: ttl_seconds.unwrap_or(self.config.refresh_ttl_seconds),
            issuer: None,
            audience: None,
            extra: Map::new(),
        })
    }

    /// Machine identity token; `sub` is the service name, no tenant.
    pub async fn issue_service_token(
        &self,
        service: &str,
        scopes: &[String],
        ttl_seconds: Option<u64>,
    ) -> AuthResult<String> {
        self.mint(Mint {
            subject: service,
            token_type: TokenType::Service,
            tenant_id: None,
            scope: join_scopes(scopes),
            ttl_seconds: ttl_seconds.unwrap_or(self.config.service_ttl_seconds),
            issuer: None,
            audience: None,
            extra: Map::new(),
        })
    }

    pub async fn issue_token_pair(
        &self,
        subject: &str,
        options: AccessTokenOptions,
    ) -> AuthResult<TokenPair> {
        let tenant_id = options.tenant_id.clone();
        let expires_in = options
            .ttl_seconds
            .unwrap_or(self.config.access_ttl_seconds);

        let access_token = self.issue_access_token(subject, options).await?;
        let refresh_token = self.issue_refresh_token(subject, tenant_id, None).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in,
        })
    }

    fn mint(&self, m: Mint<'_>) -> AuthResult<String> {
        if !self.keys.can_sign() {
            return Err(AuthError::configuration("no signing key configured"));
        }
        if m.subject.trim().is_empty() {
            return Err(AuthError::validation("subject must not be empty"));
        }
        if let Some(reserved) = m
            .extra
            .keys()
            .find(|k| RESERVED_CLAIMS.contains(&k.as_str()))
        {
            return Err(AuthError::validation(format!(
                "claim '{reserved}' is reserved"
            )));
        }

        // Revocation markers only live as long as the longest configured token.
        if m.ttl_seconds > self.config.max_lifetime_seconds() {
            return Err(AuthError::validation(format!(
                "token lifetime may not exceed {} seconds",
                self.config.max_lifetime_seconds()
            )));
        }
        let ttl = i64::try_from(m.ttl_seconds)
            .map_err(|_| AuthError::validation("token lifetime is too large"))?;
        let iat = self.clock.now().timestamp();
        let jti = Uuid::new_v4().to_string();

        let claims = TokenClaims {
            sub: Some(m.subject.to_string()),
            token_type: Some(m.token_type.as_str().to_string()),
            iat,
            exp: iat.saturating_add(ttl),
            iss: m.issuer.or_else(|| self.config.issuer.clone()),
            aud: m
                .audience
                .or_else(|| self.config.audience.clone())
                .map(Value::String),
            tenant_id: m.tenant_id,
            scope: m.scope,
            jti: Some(jti.clone()),
            extra: m.extra,
        };

        let token = self.keys.sign(&claims)?;
        debug!(
            subject = %m.subject,
            token_type = m.token_type.as_str(),
            jti = %jti,
            "issued token"
        );
        Ok(token)
    }

    /// Verify a token, reporting any failure to the audit sink.
    pub async fn verify_token(&self, token: &str, options: &VerifyOptions) -> AuthResult<TokenClaims> {
        self.verify_audited(token, options, &RequestContext::default())
            .await
    }

    async fn verify_audited(
        &self,
        token: &str,
        options: &VerifyOptions,
        request: &RequestContext,
    ) -> AuthResult<TokenClaims> {
        match self.verify_unaudited(token, options).await {
            Ok(claims) => Ok(claims),
            Err(err) => {
                let event =
                    AuthFailureEvent::new(CredentialKind::Token, err.to_string(), request, self.clock.now());
                self.audit.record_failure(event).await;
                Err(err)
            }
        }
    }

    // Each step is a hard gate. Algorithm and signature always run before any
    // claim is looked at.
    async fn verify_unaudited(
        &self,
        token: &str,
        options: &VerifyOptions,
    ) -> AuthResult<TokenClaims> {
        // (1) algorithm pinning
        let declared = peek_algorithm(token)?;
        if declared != algorithm_name(self.keys.algorithm()) {
            return Err(AuthError::InvalidAlgorithm);
        }

        // (2) signature
        let mut validation = Validation::new(self.keys.algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let claims = jsonwebtoken::decode::<TokenClaims>(token, self.keys.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidToken("signature mismatch"),
                ErrorKind::InvalidAlgorithm => AuthError::InvalidAlgorithm,
                _ => AuthError::InvalidToken("malformed token"),
            })?
            .claims;

        // (3) expiry; a zero-lifetime token is expired from the start
        let now = self.clock.now().timestamp();
        let leeway = i64::try_from(self.config.leeway_seconds).unwrap_or(i64::MAX);
        if claims.exp <= claims.iat || now > claims.exp.saturating_add(leeway) {
            return Err(AuthError::TokenExpired);
        }

        // (4) audience / issuer
        if let Some(expected) = options.expected_audience.as_deref()
            && !claims.audience_matches(expected)
        {
            return Err(AuthError::InvalidToken("audience mismatch"));
        }
        if let Some(expected) = options.expected_issuer.as_deref()
            && claims.iss.as_deref() != Some(expected)
        {
            return Err(AuthError::InvalidToken("issuer mismatch"));
        }

        // (5) type
        if let Some(expected) = options.expected_type
            && !claims.is_type(expected)
        {
            return Err(AuthError::InvalidToken("unexpected token type"));
        }

        // (6) subject
        let subject = match claims.sub.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Err(AuthError::InvalidToken("missing subject")),
        };

        // (7) revocation
        if let Some(jti) = claims.jti.as_deref()
            && self.revocations.is_token_revoked(jti).await?
        {
            return Err(AuthError::InvalidToken("revoked"));
        }
        if let Some(cutoff) = self.revocations.subject_revoked_at(subject).await?
            && claims.iat <= cutoff
        {
            return Err(AuthError::InvalidToken("revoked"));
        }

        Ok(claims)
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Only the subject and tenant carry over; the new token gets its own jti.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        scopes: Vec<String>,
        extra_claims: Map<String, Value>,
    ) -> AuthResult<String> {
        let claims = self
            .verify_token(refresh_token, &VerifyOptions::of_type(TokenType::Refresh))
            .await?;
        let subject = claims.sub.unwrap_or_default();

        self.issue_access_token(
            &subject,
            AccessTokenOptions {
                scopes,
                tenant_id: claims.tenant_id,
                extra_claims,
                ..AccessTokenOptions::default()
            },
        )
        .await
    }

    pub async fn revoke_token(&self, jti: &str) -> AuthResult<()> {
        if jti.trim().is_empty() {
            return Err(AuthError::validation("jti must not be empty"));
        }
        self.revocations.revoke_token(jti).await?;
        info!(jti = %jti, "token revoked");
        Ok(())
    }

    /// Reject every token for `subject` issued up to now. Tokens minted
    /// afterwards are unaffected.
    pub async fn revoke_all_user_tokens(&self, subject: &str) -> AuthResult<()> {
        if subject.trim().is_empty() {
            return Err(AuthError::validation("subject must not be empty"));
        }
        self.revocations
            .revoke_subject(subject, self.clock.now())
            .await?;
        info!(subject = %subject, "all tokens revoked for subject");
        Ok(())
    }

    fn boundary_options(&self) -> VerifyOptions {
        VerifyOptions {
            expected_type: Some(TokenType::Access),
            expected_audience: self.config.audience.clone(),
            expected_issuer: self.config.issuer.clone(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for TokenService {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Token
    }

    async fn authenticate(
        &self,
        credential: &str,
        request: &RequestContext,
    ) -> AuthResult<AuthContext> {
        let claims = self
            .verify_audited(credential, &self.boundary_options(), request)
            .await?;

        Ok(AuthContext {
            scopes: claims.scopes(),
            subject: claims.sub.unwrap_or_default(),
            tenant_id: claims.tenant_id,
            kind: CredentialKind::Token,
            expires_at: DateTime::from_timestamp(claims.exp, 0),
            credential_id: claims.jti,
        })
    }
}
