use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Map;

use crate::api::v1::dto::token::{TokenRequest, TokenResponse};
use crate::error::AuthError;
use crate::state::AppState;

/// `grant_type=refresh_token` only. Issuing the first pair belongs to the
/// login flow in front of this service.
pub async fn token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AuthError> {
    if req.grant_type != "refresh_token" {
        return Err(AuthError::validation("unsupported grant_type"));
    }
    let refresh_token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AuthError::validation("refresh_token is required"))?;
    let scopes = req
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let tokens = &state.auth.tokens;
    let access_token = tokens
        .refresh_access_token(&refresh_token, scopes, Map::new())
        .await?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: tokens.access_token_ttl_seconds(),
        }),
    ))
}
