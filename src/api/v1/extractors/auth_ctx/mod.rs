/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - Hand the authenticated caller (AuthContext) to handlers
 * - axum-specific plumbing stays in core; the type lives in services::auth
 */

mod core;

pub use core::AuthCtxExtractor;
