/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 * - Cheap to clone (services are behind Arc)
 */
use std::sync::Arc;

use crate::services::api_keys::types::IpRule;
use crate::services::auth::AuthCore;

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: AuthCore,
    pub trusted_proxies: Arc<[IpRule]>,
}

impl AppState {
    pub fn new(auth: AuthCore) -> Self {
        Self {
            auth,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpRule>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }
}
