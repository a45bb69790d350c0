use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claim names owned by the token service. `extra_claims` may not set them.
pub const RESERVED_CLAIMS: &[&str] = &[
    "sub",
    "type",
    "iat",
    "exp",
    "nbf",
    "iss",
    "aud",
    "tenant_id",
    "scope",
    "jti",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    Service,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::Service => "service",
        }
    }
}

/// JWT payload.
///
/// NOTE:
/// - `sub` and `type` are optional at the serde level so that a token lacking
///   them still decodes and is rejected by the matching verification step.
/// - `aud` is kept as `Value` to accept both a string and an array.
/// - `scope` is space-separated, as in OAuth 2.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default)]
    pub iat: i64,
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn is_type(&self, expected: TokenType) -> bool {
        self.token_type.as_deref() == Some(expected.as_str())
    }

    pub fn audience_matches(&self, expected: &str) -> bool {
        match &self.aud {
            Some(Value::String(s)) => s == expected,
            Some(Value::Array(arr)) => arr
                .iter()
                .any(|v| matches!(v, Value::String(s) if s == expected)),
            _ => false,
        }
    }
}

pub fn join_scopes(scopes: &[String]) -> Option<String> {
    let joined = scopes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}
