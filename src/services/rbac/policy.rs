//! Policy tuples and the matching rules applied to them.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(format!("unknown effect: {other}")),
        }
    }
}

/// `(subject, object, action, effect)`. The subject is a role name or a
/// (possibly tenant-qualified) user key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub action: String,
    pub effect: Effect,
}

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
            effect,
        }
    }

    pub fn matches(&self, object: &str, action: &str) -> bool {
        pattern_matches(&self.object, object) && pattern_matches(&self.action, action)
    }
}

/// A permission materialized from a role set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermission {
    pub resource: String,
    pub action: String,
    pub effect: Effect,
}

/// `*` matches anything; a trailing `*` matches by prefix (`documents/*`).
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

/// Policy subject for a user, qualified by tenant when one is given.
pub fn subject_key(user: &str, tenant: Option<&str>) -> String {
    match tenant {
        Some(tenant) => format!("{tenant}:{user}"),
        None => user.to_string(),
    }
}
