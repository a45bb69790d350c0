/*
 * Responsibility
 * - Public interface of the middleware layer
 * - http: request id / tracing / limits, auth: credential verification
 */
pub mod auth;
pub mod http;
