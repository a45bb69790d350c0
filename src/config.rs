/*
 * Responsibility
 * - Read environment variables (.env supported) into typed settings
 * - Validate values (missing or malformed settings abort startup)
 * - Split settings per component so services can be built without the environment
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::api_keys::scopes::DEFAULT_SCOPES;
use crate::services::api_keys::types::{IpRule, RateLimit, RateWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Key material for the token service. Secrets never appear in Debug output.
#[derive(Clone)]
pub struct SigningConfig {
    pub algorithm: String,
    pub secret: Option<String>,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("public_key_pem", &self.public_key_pem.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub service_ttl_seconds: u64,
    pub leeway_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            access_ttl_seconds: 15 * 60,
            refresh_ttl_seconds: 30 * 24 * 60 * 60,
            service_ttl_seconds: 60 * 60,
            leeway_seconds: 30,
        }
    }
}

impl TokenConfig {
    /// Upper bound on any token lifetime, including per-call overrides.
    pub fn max_lifetime_seconds(&self) -> u64 {
        self.access_ttl_seconds
            .max(self.refresh_ttl_seconds)
            .max(self.service_ttl_seconds)
    }

    /// How long a revocation marker must outlive its revoke call.
    pub fn revocation_ttl(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_seconds().saturating_add(self.leeway_seconds))
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyConfig {
    /// Cleartext prefix of every raw key (`<prefix>_<random>`).
    pub prefix: String,
    pub max_active_per_owner: usize,
    pub default_rate_limit: RateLimit,
    /// Recognised scope strings.
    pub scopes: Vec<String>,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "ak".to_string(),
            max_active_per_owner: 10,
            default_rate_limit: RateLimit::new(1000, RateWindow::Hour),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl_seconds: u64,
    pub max_per_user: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 24 * 60 * 60,
            max_per_user: 5,
        }
    }
}

#[derive(Clone)]
pub struct StoreConfig {
    /// Absent means process-local stores.
    pub valkey_url: Option<String>,
    pub timeout: Duration,
    pub key_prefix: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // URL may embed a password
        f.debug_struct("StoreConfig")
            .field("valkey", &self.valkey_url.is_some())
            .field("timeout", &self.timeout)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            valkey_url: None,
            timeout: Duration::from_millis(250),
            key_prefix: "authcore".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub signing: SigningConfig,
    pub tokens: TokenConfig,
    pub api_keys: ApiKeyConfig,
    pub sessions: SessionConfig,
    pub store: StoreConfig,

    /// Peers whose `X-Forwarded-*` headers are believed. Empty trusts nobody.
    pub trusted_proxies: Vec<IpRule>,
}

fn optional(key: &'static str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

// PEMs are commonly passed through env files with escaped newlines.
fn pem(key: &'static str) -> Option<String> {
    optional(key).map(|v| v.replace("\\n", "\n"))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = parse_or("PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let algorithm = optional("JWT_ALGORITHM").unwrap_or_else(|| "HS256".to_string());
        let signing = SigningConfig {
            secret: optional("JWT_SECRET"),
            private_key_pem: pem("JWT_PRIVATE_KEY_PEM"),
            public_key_pem: pem("JWT_PUBLIC_KEY_PEM"),
            algorithm,
        };
        if signing.algorithm.to_ascii_uppercase().starts_with("HS") {
            if signing.secret.is_none() {
                return Err(ConfigError::Missing("JWT_SECRET"));
            }
        } else if signing.private_key_pem.is_none() && signing.public_key_pem.is_none() {
            return Err(ConfigError::Missing("JWT_PRIVATE_KEY_PEM"));
        }

        let token_defaults = TokenConfig::default();
        let tokens = TokenConfig {
            issuer: optional("JWT_ISSUER"),
            audience: optional("JWT_AUDIENCE"),
            access_ttl_seconds: parse_or(
                "ACCESS_TOKEN_TTL_SECONDS",
                token_defaults.access_ttl_seconds,
            )?,
            refresh_ttl_seconds: parse_or(
                "REFRESH_TOKEN_TTL_SECONDS",
                token_defaults.refresh_ttl_seconds,
            )?,
            service_ttl_seconds: parse_or(
                "SERVICE_TOKEN_TTL_SECONDS",
                token_defaults.service_ttl_seconds,
            )?,
            leeway_seconds: parse_or("TOKEN_LEEWAY_SECONDS", token_defaults.leeway_seconds)?,
        };

        let key_defaults = ApiKeyConfig::default();
        let window = match optional("API_KEY_RATE_LIMIT_WINDOW") {
            Some(raw) => raw
                .parse::<RateWindow>()
                .map_err(|_| ConfigError::Invalid("API_KEY_RATE_LIMIT_WINDOW"))?,
            None => key_defaults.default_rate_limit.window,
        };
        let requests = parse_or(
            "API_KEY_RATE_LIMIT_REQUESTS",
            key_defaults.default_rate_limit.requests,
        )?;
        if requests == 0 {
            return Err(ConfigError::Invalid("API_KEY_RATE_LIMIT_REQUESTS"));
        }
        let scopes = match optional("API_KEY_SCOPES") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>(),
            None => key_defaults.scopes,
        };
        let api_keys = ApiKeyConfig {
            prefix: optional("API_KEY_PREFIX").unwrap_or(key_defaults.prefix),
            max_active_per_owner: parse_or(
                "API_KEY_MAX_PER_OWNER",
                key_defaults.max_active_per_owner,
            )?,
            default_rate_limit: RateLimit::new(requests, window),
            scopes,
        };
        if api_keys.prefix.contains('_') {
            return Err(ConfigError::Invalid("API_KEY_PREFIX"));
        }

        let session_defaults = SessionConfig::default();
        let sessions = SessionConfig {
            ttl_seconds: parse_or("SESSION_TTL_SECONDS", session_defaults.ttl_seconds)?,
            max_per_user: parse_or("SESSION_MAX_PER_USER", session_defaults.max_per_user)?,
        };
        if sessions.max_per_user == 0 {
            return Err(ConfigError::Invalid("SESSION_MAX_PER_USER"));
        }

        let store_defaults = StoreConfig::default();
        let store = StoreConfig {
            valkey_url: optional("VALKEY_URL"),
            timeout: Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 250u64)?),
            key_prefix: optional("STORE_KEY_PREFIX").unwrap_or(store_defaults.key_prefix),
        };

        let trusted_proxies = match optional("TRUSTED_PROXIES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<IpRule>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigError::Invalid("TRUSTED_PROXIES"))?,
            None => Vec::new(),
        };

        Ok(Self {
            addr,
            app_env,
            signing,
            tokens,
            api_keys,
            sessions,
            store,
            trusted_proxies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revocation_ttl_covers_longest_token_and_leeway() {
        let tokens = TokenConfig {
            access_ttl_seconds: 60,
            refresh_ttl_seconds: 600,
            service_ttl_seconds: 120,
            leeway_seconds: 5,
            ..TokenConfig::default()
        };
        assert_eq!(tokens.revocation_ttl(), Duration::from_secs(605));
    }

    #[test]
    fn signing_config_debug_redacts_secrets() {
        let signing = SigningConfig {
            algorithm: "HS256".into(),
            secret: Some("super-secret-value".into()),
            private_key_pem: None,
            public_key_pem: None,
        };
        let rendered = format!("{signing:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn config_error_names_the_variable() {
        assert_eq!(
            ConfigError::Missing("JWT_SECRET").to_string(),
            "missing configuration: JWT_SECRET"
        );
    }
}
