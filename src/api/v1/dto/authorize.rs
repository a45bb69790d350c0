use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub resource: String,
    pub action: String,
    /// Also require this scope on the presented credential.
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    pub subject: String,
    pub tenant_id: Option<String>,
}
