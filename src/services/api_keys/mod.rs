pub mod rate_limit;
pub mod scopes;
pub mod service;
pub mod store;
pub mod types;

pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, RateLimiter};
pub use service::ApiKeyService;
pub use store::{ApiKeyStore, MemoryApiKeyStore};
pub use types::{
    ApiKey, ApiKeyStatus, ApiKeyUpdate, CreateApiKeyRequest, CreatedApiKey, RateLimit, RateWindow,
};
