//! Capability registry: each credential kind maps to whatever can verify it.
//!
//! Callers depend on `CredentialVerifier` only. A kind with no registered
//! verifier is simply not accepted.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};
use crate::services::auth::context::{AuthContext, CredentialKind, RequestContext};

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    fn kind(&self) -> CredentialKind;

    async fn authenticate(
        &self,
        credential: &str,
        request: &RequestContext,
    ) -> AuthResult<AuthContext>;
}

/// One credential as presented by a caller.
#[derive(Clone, PartialEq, Eq)]
pub enum PresentedCredential {
    Bearer(String),
    ApiKey(String),
    Session(String),
}

impl std::fmt::Debug for PresentedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the credential itself
        f.debug_tuple("PresentedCredential")
            .field(&self.kind())
            .finish()
    }
}

impl PresentedCredential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            PresentedCredential::Bearer(_) => CredentialKind::Token,
            PresentedCredential::ApiKey(_) => CredentialKind::ApiKey,
            PresentedCredential::Session(_) => CredentialKind::Session,
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            PresentedCredential::Bearer(s)
            | PresentedCredential::ApiKey(s)
            | PresentedCredential::Session(s) => s,
        }
    }
}

#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<CredentialKind, Arc<dyn CredentialVerifier>>,
}

impl std::fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("kinds", &self.verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the verifier's own kind, replacing any previous one.
    pub fn register(&mut self, verifier: Arc<dyn CredentialVerifier>) {
        self.verifiers.insert(verifier.kind(), verifier);
    }

    pub fn with(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.register(verifier);
        self
    }

    pub fn get(&self, kind: CredentialKind) -> Option<&Arc<dyn CredentialVerifier>> {
        self.verifiers.get(&kind)
    }

    pub fn supports(&self, kind: CredentialKind) -> bool {
        self.verifiers.contains_key(&kind)
    }

    pub async fn authenticate(
        &self,
        credential: &PresentedCredential,
        request: &RequestContext,
    ) -> AuthResult<AuthContext> {
        let verifier = self
            .get(credential.kind())
            .ok_or(AuthError::Authentication("unsupported credential"))?;

        verifier.authenticate(credential.secret(), request).await
    }
}
