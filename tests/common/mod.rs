//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, TimeZone, Utc};

use authcore::config::{
    ApiKeyConfig, AppEnv, Config, SessionConfig, SigningConfig, StoreConfig, TokenConfig,
};
use authcore::services::auth::AuthCore;
use authcore::services::auth::audit::MemoryAuditSink;
use authcore::services::auth::codec::{RsaKeyPair, generate_rsa_keypair};
use authcore::services::auth::factory::{assemble, build_signing_keys};
use authcore::services::cache::{GuardedCache, MemoryCache};
use authcore::services::clock::ManualClock;
use authcore::services::sessions::MemorySessionStore;

pub const SECRET: &str = "integration-secret-0123456789-abcdefghij";

/// Fixed start time; every test clock starts at 12:00:00.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// RSA generation is slow; share one pair across a test binary.
pub fn rsa_pair() -> &'static RsaKeyPair {
    static PAIR: OnceLock<RsaKeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_rsa_keypair(2048).expect("rsa keypair"))
}

pub fn hmac_signing() -> SigningConfig {
    SigningConfig {
        algorithm: "HS256".to_string(),
        secret: Some(SECRET.to_string()),
        private_key_pem: None,
        public_key_pem: None,
    }
}

pub fn rsa_signing() -> SigningConfig {
    SigningConfig {
        algorithm: "RS256".to_string(),
        secret: None,
        private_key_pem: Some(rsa_pair().private_key_pem.clone()),
        public_key_pem: None,
    }
}

pub fn test_config() -> Config {
    Config {
        addr: "127.0.0.1:0".parse().expect("addr"),
        app_env: AppEnv::Development,
        signing: hmac_signing(),
        tokens: TokenConfig::default(),
        api_keys: ApiKeyConfig::default(),
        sessions: SessionConfig::default(),
        store: StoreConfig::default(),
        trusted_proxies: Vec::new(),
    }
}

/// A fully wired core over in-process stores with a controllable clock.
pub struct Harness {
    pub core: AuthCore,
    pub clock: Arc<ManualClock>,
    pub audit: MemoryAuditSink,
}

pub fn harness_with(config: Config) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let audit = MemoryAuditSink::new();
    let keys = build_signing_keys(&config.signing).expect("signing keys");
    let cache = GuardedCache::new(MemoryCache::new(), config.store.timeout);

    let core = assemble(
        cache,
        Arc::new(MemorySessionStore::new()),
        keys,
        &config,
        Arc::new(audit.clone()),
        clock.clone(),
    );

    Harness { core, clock, audit }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn scopes(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
