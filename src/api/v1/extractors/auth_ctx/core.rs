use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::services::auth::AuthContext;
use crate::state::AppState;

/// Extractor for the `AuthContext` inserted by the access middleware.
/// Missing context (route not behind the middleware) is a 401.
pub struct AuthCtxExtractor(pub AuthContext);

impl FromRequestParts<AppState> for AuthCtxExtractor
where
    AppState: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthCtxExtractor)
            .ok_or(AuthError::Authentication("missing credentials"))
    }
}
