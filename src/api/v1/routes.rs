/*
 * Responsibility
 * - v1 URL structure
 * - Which routes sit behind the access middleware
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::v1::handlers::{authorize::authorize, me::me, token::token};
use crate::middleware::auth::access;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(me))
        .route("/authorize", post(authorize));
    let protected = access::apply(protected, state);

    // The refresh token in the body is the credential here
    let public = Router::new().route("/token", post(token));

    public.merge(protected)
}
