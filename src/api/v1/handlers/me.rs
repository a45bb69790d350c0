use axum::Json;

use crate::api::v1::extractors::AuthCtxExtractor;
use crate::services::auth::AuthContext;

/// Echo the authenticated caller.
pub async fn me(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<AuthContext> {
    Json(ctx)
}
