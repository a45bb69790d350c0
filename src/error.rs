/*
 * Responsibility
 * - Typed error taxonomy shared by tokens, API keys, sessions and RBAC
 * - IntoResponse implementation (HTTP status / JSON error body)
 * - Store failures are converted here so every caller fails closed
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::cache::CacheError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or unusable keys/secrets. Fatal at startup, never retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Declared token algorithm does not match the configured one.
    #[error("token algorithm is not accepted")]
    InvalidAlgorithm,

    #[error("invalid token: {0}")]
    InvalidToken(&'static str),

    #[error("token has expired")]
    TokenExpired,

    #[error("{0}")]
    Authentication(&'static str),

    #[error("permission denied: {0}")]
    Authorization(String),

    #[error("rate limit exceeded, {remaining} requests remaining; retry after {retry_after_secs}s")]
    RateLimited {
        limit: u64,
        remaining: u64,
        retry_after_secs: u64,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("credential store unavailable")]
    StoreUnavailable(#[source] CacheError),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::InvalidAlgorithm
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired
            | AuthError::Authentication(_)
            | AuthError::StoreUnavailable(_) => StatusCode::UNAUTHORIZED,
            AuthError::Authorization(_) => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "CONFIGURATION_ERROR",
            AuthError::InvalidAlgorithm => "INVALID_ALGORITHM",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::Authentication(_) => "AUTHENTICATION_FAILED",
            AuthError::Authorization(_) => "FORBIDDEN",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::StoreUnavailable(_) => "AUTHENTICATION_UNAVAILABLE",
        }
    }

    /// Only quota exhaustion clears by itself; everything else needs a different credential.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::RateLimited { .. })
    }

    // Internal details (configuration, backend errors) and the reason a token
    // failed its checks stay in the logs and the audit sink.
    fn public_message(&self) -> String {
        match self {
            AuthError::Configuration(_) => "internal server error".to_string(),
            AuthError::StoreUnavailable(_) => "authentication unavailable".to_string(),
            AuthError::InvalidToken(reason) if *reason != "revoked" => "invalid token".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(e: CacheError) -> Self {
        AuthError::StoreUnavailable(e)
    }
}

impl From<ConfigError> for AuthError {
    fn from(e: ConfigError) -> Self {
        AuthError::Configuration(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            AuthError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponseBody {
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
