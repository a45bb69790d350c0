use axum::Json;
use axum::extract::State;

use crate::api::v1::dto::authorize::{AuthorizeRequest, AuthorizeResponse};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AuthError;
use crate::state::AppState;

/// RBAC decision for the caller, plus an optional scope requirement.
/// A deny is a 403.
pub async fn authorize(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, AuthError> {
    if let Some(scope) = req.scope.as_deref()
        && !state
            .auth
            .api_keys
            .check_permission(&ctx, scope, ctx.tenant_id.as_deref())
    {
        return Err(AuthError::Authorization(format!("missing scope {scope}")));
    }

    state
        .auth
        .rbac
        .authorize(&ctx, &req.resource, &req.action)
        .await?;

    Ok(Json(AuthorizeResponse {
        allowed: true,
        subject: ctx.subject,
        tenant_id: ctx.tenant_id,
    }))
}
