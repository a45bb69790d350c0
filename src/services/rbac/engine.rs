use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};
use crate::services::auth::context::AuthContext;
use crate::services::rbac::graph::RoleWalk;
use crate::services::rbac::policy::{Effect, EffectivePermission, PolicyRule, subject_key};
use crate::services::rbac::store::PolicyStore;

/// Role/permission evaluation over a `PolicyStore`.
///
/// A request is granted iff some matching `allow` tuple exists among the
/// subject and every role reachable from it, and no matching `deny` does.
/// Deny always wins.
#[derive(Debug, Clone)]
pub struct RbacEngine {
    store: Arc<dyn PolicyStore>,
}

fn require(value: &str, field: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Evaluate one (resource, action) against an already resolved rule set.
fn decide(rules: &[PolicyRule], resource: &str, action: &str) -> bool {
    let mut allowed = false;
    for rule in rules.iter().filter(|r| r.matches(resource, action)) {
        match rule.effect {
            Effect::Deny => return false,
            Effect::Allow => allowed = true,
        }
    }
    allowed
}

impl RbacEngine {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    pub async fn add_role_for_user(
        &self,
        user: &str,
        role: &str,
        tenant: Option<&str>,
    ) -> AuthResult<bool> {
        require(user, "user")?;
        require(role, "role")?;
        let added = self
            .store
            .add_grouping(&subject_key(user, tenant), role)
            .await?;
        if added {
            info!(user = %user, role = %role, tenant = ?tenant, "role granted");
        }
        Ok(added)
    }

    pub async fn delete_role_for_user(
        &self,
        user: &str,
        role: &str,
        tenant: Option<&str>,
    ) -> AuthResult<bool> {
        let removed = self
            .store
            .remove_grouping(&subject_key(user, tenant), role)
            .await?;
        if removed {
            info!(user = %user, role = %role, tenant = ?tenant, "role removed");
        }
        Ok(removed)
    }

    /// Direct assignment only; inherited roles are not considered.
    pub async fn has_role_for_user(
        &self,
        user: &str,
        role: &str,
        tenant: Option<&str>,
    ) -> AuthResult<bool> {
        Ok(self
            .store
            .roles_of(&subject_key(user, tenant))
            .await?
            .iter()
            .any(|r| r == role))
    }

    pub async fn get_roles_for_user(
        &self,
        user: &str,
        tenant: Option<&str>,
    ) -> AuthResult<Vec<String>> {
        self.store.roles_of(&subject_key(user, tenant)).await
    }

    /// Direct members of `role`, as stored (tenant-qualified where applicable).
    pub async fn get_users_for_role(&self, role: &str) -> AuthResult<Vec<String>> {
        self.store.members_of(role).await
    }

    pub async fn add_permission(
        &self,
        role: &str,
        resource: &str,
        action: &str,
        effect: Effect,
    ) -> AuthResult<bool> {
        require(role, "role")?;
        require(resource, "resource")?;
        require(action, "action")?;
        let added = self
            .store
            .add_rule(PolicyRule::new(role, resource, action, effect))
            .await?;
        if added {
            info!(subject = %role, resource = %resource, action = %action, effect = %effect, "permission added");
        }
        Ok(added)
    }

    pub async fn remove_permission(
        &self,
        role: &str,
        resource: &str,
        action: &str,
        effect: Effect,
    ) -> AuthResult<bool> {
        self.store
            .remove_rule(&PolicyRule::new(role, resource, action, effect))
            .await
    }

    /// `child` inherits every permission of `parent`.
    pub async fn add_role_inheritance(&self, child: &str, parent: &str) -> AuthResult<bool> {
        require(child, "child role")?;
        require(parent, "parent role")?;
        if child == parent {
            return Err(AuthError::validation("a role cannot inherit from itself"));
        }
        self.store.add_grouping(child, parent).await
    }

    pub async fn remove_role_inheritance(&self, child: &str, parent: &str) -> AuthResult<bool> {
        self.store.remove_grouping(child, parent).await
    }

    /// Drops the role's permissions and every grouping that mentions it.
    pub async fn delete_role(&self, role: &str) -> AuthResult<()> {
        require(role, "role")?;
        self.store.remove_rules_for_subject(role).await?;
        for member in self.store.members_of(role).await? {
            self.store.remove_grouping(&member, role).await?;
        }
        for parent in self.store.roles_of(role).await? {
            self.store.remove_grouping(role, &parent).await?;
        }
        info!(role = %role, "role deleted");
        Ok(())
    }

    async fn expand(&self, starts: Vec<String>) -> AuthResult<Vec<String>> {
        let mut walk = RoleWalk::new(starts);
        while let Some(name) = walk.next_pending() {
            walk.extend(self.store.roles_of(&name).await?);
        }
        Ok(walk.into_names())
    }

    /// Every role reachable from the user, transitively.
    pub async fn get_implicit_roles_for_user(
        &self,
        user: &str,
        tenant: Option<&str>,
    ) -> AuthResult<Vec<String>> {
        let key = subject_key(user, tenant);
        let mut names = self.expand(vec![key.clone()]).await?;
        names.retain(|n| *n != key);
        Ok(names)
    }

    /// All permissions reachable from `roles`, one entry per (action, resource).
    /// When two tuples share a pair, the later one wins.
    pub async fn get_effective_permissions(
        &self,
        roles: &[String],
    ) -> AuthResult<Vec<EffectivePermission>> {
        let mut out: Vec<EffectivePermission> = Vec::new();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();

        for subject in self.expand(roles.to_vec()).await? {
            for rule in self.store.rules_for_subject(&subject).await? {
                let permission = EffectivePermission {
                    resource: rule.object,
                    action: rule.action,
                    effect: rule.effect,
                };
                let pair = (permission.action.clone(), permission.resource.clone());
                match seen.get(&pair) {
                    Some(&idx) => out[idx] = permission,
                    None => {
                        seen.insert(pair, out.len());
                        out.push(permission);
                    }
                }
            }
        }
        Ok(out)
    }

    async fn resolved_rules(&self, user: &str, tenant: Option<&str>) -> AuthResult<Vec<PolicyRule>> {
        let mut rules = Vec::new();
        for subject in self.expand(vec![subject_key(user, tenant)]).await? {
            rules.extend(self.store.rules_for_subject(&subject).await?);
        }
        Ok(rules)
    }

    pub async fn check_permission(
        &self,
        user: &str,
        resource: &str,
        action: &str,
        tenant: Option<&str>,
    ) -> AuthResult<bool> {
        if user.trim().is_empty() {
            return Ok(false);
        }
        let rules = self.resolved_rules(user, tenant).await?;
        let granted = decide(&rules, resource, action);
        debug!(user = %user, resource = %resource, action = %action, tenant = ?tenant, granted, "permission check");
        Ok(granted)
    }

    /// Several (resource, action) checks for one subject; roles are resolved once.
    pub async fn check_permissions_batch(
        &self,
        user: &str,
        checks: &[(String, String)],
        tenant: Option<&str>,
    ) -> AuthResult<Vec<bool>> {
        if user.trim().is_empty() {
            return Ok(vec![false; checks.len()]);
        }
        let rules = self.resolved_rules(user, tenant).await?;
        Ok(checks
            .iter()
            .map(|(resource, action)| decide(&rules, resource, action))
            .collect())
    }

    /// `check_permission` for an authenticated caller, as an error on deny.
    pub async fn authorize(
        &self,
        ctx: &AuthContext,
        resource: &str,
        action: &str,
    ) -> AuthResult<()> {
        if self
            .check_permission(&ctx.subject, resource, action, ctx.tenant_id.as_deref())
            .await?
        {
            return Ok(());
        }
        Err(AuthError::Authorization(format!("{action} on {resource}")))
    }
}
