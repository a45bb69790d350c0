//! Token and policy authorization core.
//!
//! - JWT issuance, verification and revocation (`services::auth`)
//! - RBAC with allow/deny tuples and role inheritance (`services::rbac`)
//! - API keys with fixed-window rate limiting (`services::api_keys`)
//! - Server-side sessions (`services::sessions`)
//!
//! Every verifier produces the same `AuthContext`; a thin axum layer
//! (`api`, `middleware`) exposes them over HTTP.
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
