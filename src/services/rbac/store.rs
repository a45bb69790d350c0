//! Policy storage: permission tuples plus the `(member, role)` grouping relation.
use async_trait::async_trait;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::AuthResult;
use crate::services::rbac::policy::PolicyRule;

/// Point lookups and per-subject/per-role scans. No ordering guarantee is
/// required across subjects; within one subject rules come back in insertion
/// order.
#[async_trait]
pub trait PolicyStore: Send + Sync + std::fmt::Debug {
    /// Returns false when the identical rule already exists.
    async fn add_rule(&self, rule: PolicyRule) -> AuthResult<bool>;

    async fn remove_rule(&self, rule: &PolicyRule) -> AuthResult<bool>;

    async fn rules_for_subject(&self, subject: &str) -> AuthResult<Vec<PolicyRule>>;

    async fn remove_rules_for_subject(&self, subject: &str) -> AuthResult<usize>;

    async fn add_grouping(&self, member: &str, role: &str) -> AuthResult<bool>;

    async fn remove_grouping(&self, member: &str, role: &str) -> AuthResult<bool>;

    /// Roles `member` belongs to directly.
    async fn roles_of(&self, member: &str) -> AuthResult<Vec<String>>;

    /// Direct members (users or child roles) of `role`.
    async fn members_of(&self, role: &str) -> AuthResult<Vec<String>>;
}

/// Concurrent in-memory store.
///
/// Sharded maps keep reads for one subject from waiting on writes to another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyStore {
    rules: Arc<DashMap<String, Vec<PolicyRule>>>,
    parents: Arc<DashMap<String, Vec<String>>>,
    members: Arc<DashMap<String, Vec<String>>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

fn remove_value(map: &DashMap<String, Vec<String>>, key: &str, value: &str) -> bool {
    let mut removed = false;
    if let Some(mut list) = map.get_mut(key) {
        let before = list.len();
        list.retain(|v| v != value);
        removed = list.len() != before;
    }
    map.remove_if(key, |_, list| list.is_empty());
    removed
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn add_rule(&self, rule: PolicyRule) -> AuthResult<bool> {
        let mut rules = self.rules.entry(rule.subject.clone()).or_default();
        if rules.contains(&rule) {
            return Ok(false);
        }
        rules.push(rule);
        Ok(true)
    }

    async fn remove_rule(&self, rule: &PolicyRule) -> AuthResult<bool> {
        let mut removed = false;
        if let Some(mut rules) = self.rules.get_mut(&rule.subject) {
            let before = rules.len();
            rules.retain(|r| r != rule);
            removed = rules.len() != before;
        }
        self.rules.remove_if(&rule.subject, |_, rules| rules.is_empty());
        Ok(removed)
    }

    async fn rules_for_subject(&self, subject: &str) -> AuthResult<Vec<PolicyRule>> {
        Ok(self
            .rules
            .get(subject)
            .map(|rules| rules.clone())
            .unwrap_or_default())
    }

    async fn remove_rules_for_subject(&self, subject: &str) -> AuthResult<usize> {
        Ok(self
            .rules
            .remove(subject)
            .map(|(_, rules)| rules.len())
            .unwrap_or(0))
    }

    async fn add_grouping(&self, member: &str, role: &str) -> AuthResult<bool> {
        let added = push_unique(&mut self.parents.entry(member.to_string()).or_default(), role);
        if added {
            push_unique(&mut self.members.entry(role.to_string()).or_default(), member);
        }
        Ok(added)
    }

    async fn remove_grouping(&self, member: &str, role: &str) -> AuthResult<bool> {
        let removed = remove_value(&self.parents, member, role);
        remove_value(&self.members, role, member);
        Ok(removed)
    }

    async fn roles_of(&self, member: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .parents
            .get(member)
            .map(|roles| roles.clone())
            .unwrap_or_default())
    }

    async fn members_of(&self, role: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .members
            .get(role)
            .map(|members| members.clone())
            .unwrap_or_default())
    }
}
