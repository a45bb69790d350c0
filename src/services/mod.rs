/*
 * Responsibility
 * - Credential verification, issuance and policy evaluation
 * - Store abstractions shared by the services (cache, clock)
 */
pub mod api_keys;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod rbac;
pub mod sessions;
