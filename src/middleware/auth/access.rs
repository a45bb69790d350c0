//! Verify the presented credential and put the resulting `AuthContext` into
//! request extensions.
//!
//! - Exactly one credential per request (see `credentials`)
//! - Dispatch goes through the verifier registry, so a credential kind with no
//!   registered verifier is rejected
//! - Any failure, including a store timeout, ends the request with 401/429

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AuthError;
use crate::middleware::auth::credentials::{presented_credential, request_context};
use crate::state::AppState;

/// Apply authentication to every route of `router`.
///
/// ```ignore
/// let protected = middleware::auth::access::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8: `from_fn` cannot take a State extractor, pass state explicitly
    router.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let credential = presented_credential(req.headers())?;
    let request = request_context(&req, &state.trusted_proxies);

    let ctx = match state.auth.verifiers.authenticate(&credential, &request).await {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::warn!(
                kind = %credential.kind(),
                error = %err,
                "credential verification failed"
            );
            return Err(err);
        }
    };

    tracing::debug!(subject = %ctx.subject, kind = %ctx.kind, "request authenticated");

    // middleware -> extractor
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}
