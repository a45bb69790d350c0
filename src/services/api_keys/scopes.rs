//! Recognised API key scopes.
//!
//! Scopes are `<verb>:<resource>` strings checked by exact containment.

/// Read user profiles
pub const SCOPE_READ_USERS: &str = "read:users";
/// Create, update and delete users
pub const SCOPE_WRITE_USERS: &str = "write:users";

pub const SCOPE_READ_KEYS: &str = "read:keys";
pub const SCOPE_WRITE_KEYS: &str = "write:keys";

pub const SCOPE_READ_SESSIONS: &str = "read:sessions";
pub const SCOPE_WRITE_SESSIONS: &str = "write:sessions";

/// Read roles, permissions and grants
pub const SCOPE_READ_POLICIES: &str = "read:policies";
/// Change roles, permissions and grants
pub const SCOPE_WRITE_POLICIES: &str = "write:policies";

/// Administrative operations. Does not imply the other scopes.
pub const SCOPE_ADMIN: &str = "admin";

/// Catalogue used when no override is configured.
pub const DEFAULT_SCOPES: &[&str] = &[
    SCOPE_READ_USERS,
    SCOPE_WRITE_USERS,
    SCOPE_READ_KEYS,
    SCOPE_WRITE_KEYS,
    SCOPE_READ_SESSIONS,
    SCOPE_WRITE_SESSIONS,
    SCOPE_READ_POLICIES,
    SCOPE_WRITE_POLICIES,
    SCOPE_ADMIN,
];

/// First requested scope missing from `catalogue`, if any.
pub fn first_unknown<'a>(requested: &'a [String], catalogue: &[String]) -> Option<&'a str> {
    requested
        .iter()
        .map(String::as_str)
        .find(|scope| !catalogue.iter().any(|known| known == scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_first_unknown_scope() {
        let catalogue: Vec<String> = DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        let requested = vec!["read:users".to_string(), "launch:missiles".to_string()];
        assert_eq!(first_unknown(&requested, &catalogue), Some("launch:missiles"));
        assert_eq!(first_unknown(&requested[..1], &catalogue), None);
    }
}
