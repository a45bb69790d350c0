pub mod audit;
pub mod claims;
pub mod codec;
pub mod context;
pub mod factory;
pub mod registry;
pub mod revocation;
pub mod token_service;

pub use context::{AuthContext, CredentialKind, RequestContext};
pub use factory::{AuthCore, build_auth_core};
pub use registry::{CredentialVerifier, PresentedCredential, VerifierRegistry};
pub use token_service::{AccessTokenOptions, TokenPair, TokenService, VerifyOptions};
