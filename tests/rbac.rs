use std::sync::Arc;

use authcore::error::AuthError;
use authcore::services::auth::{AuthContext, CredentialKind};
use authcore::services::rbac::{Effect, MemoryPolicyStore, RbacEngine};

fn engine() -> RbacEngine {
    RbacEngine::new(Arc::new(MemoryPolicyStore::new()))
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(r, a)| (r.to_string(), a.to_string()))
        .collect()
}

#[tokio::test]
async fn direct_deny_overrides_inherited_allow() {
    let rbac = engine();
    rbac.add_permission("editor", "document", "write", Effect::Allow)
        .await
        .expect("allow");
    rbac.add_role_for_user("u2", "editor", None).await.expect("grant");
    assert!(rbac.check_permission("u2", "document", "write", None).await.expect("check"));

    rbac.add_permission("u2", "document", "write", Effect::Deny)
        .await
        .expect("deny");
    assert!(!rbac.check_permission("u2", "document", "write", None).await.expect("check"));
}

#[tokio::test]
async fn unknown_subject_and_empty_subject_are_denied() {
    let rbac = engine();
    rbac.add_permission("viewer", "*", "read", Effect::Allow)
        .await
        .expect("allow");

    assert!(!rbac.check_permission("nobody", "doc", "read", None).await.expect("check"));
    assert!(!rbac.check_permission("", "doc", "read", None).await.expect("check"));
}

#[tokio::test]
async fn wildcards_match_any_and_prefix() {
    let rbac = engine();
    rbac.add_permission("ops", "*", "read", Effect::Allow).await.expect("rule");
    rbac.add_permission("ops", "reports/*", "*", Effect::Allow).await.expect("rule");
    rbac.add_role_for_user("u1", "ops", None).await.expect("grant");

    let results = rbac
        .check_permissions_batch(
            "u1",
            &pairs(&[
                ("anything", "read"),
                ("reports/q1", "delete"),
                ("invoices/q1", "delete"),
            ]),
            None,
        )
        .await
        .expect("batch");
    assert_eq!(results, vec![true, true, false]);
}

#[tokio::test]
async fn wildcard_deny_beats_specific_allow() {
    let rbac = engine();
    rbac.add_permission("contractor", "payroll", "read", Effect::Allow)
        .await
        .expect("allow");
    rbac.add_permission("contractor", "*", "*", Effect::Deny)
        .await
        .expect("deny");
    rbac.add_role_for_user("u1", "contractor", None).await.expect("grant");

    assert!(!rbac.check_permission("u1", "payroll", "read", None).await.expect("check"));
}

#[tokio::test]
async fn permissions_flow_down_the_hierarchy() {
    let rbac = engine();
    rbac.add_permission("viewer", "doc", "read", Effect::Allow).await.expect("rule");
    rbac.add_permission("editor", "doc", "write", Effect::Allow).await.expect("rule");
    rbac.add_role_inheritance("editor", "viewer").await.expect("inherit");
    rbac.add_role_inheritance("admin", "editor").await.expect("inherit");
    rbac.add_role_for_user("root", "admin", None).await.expect("grant");

    assert!(rbac.check_permission("root", "doc", "read", None).await.expect("check"));
    assert!(rbac.check_permission("root", "doc", "write", None).await.expect("check"));

    let mut implicit = rbac
        .get_implicit_roles_for_user("root", None)
        .await
        .expect("implicit");
    implicit.sort();
    assert_eq!(implicit, vec!["admin", "editor", "viewer"]);

    // Direct assignment only.
    assert!(rbac.has_role_for_user("root", "admin", None).await.expect("has"));
    assert!(!rbac.has_role_for_user("root", "viewer", None).await.expect("has"));

    rbac.remove_role_inheritance("editor", "viewer").await.expect("remove");
    assert!(!rbac.check_permission("root", "doc", "read", None).await.expect("check"));
}

#[tokio::test]
async fn cyclic_hierarchy_terminates() {
    let rbac = engine();
    rbac.add_role_inheritance("a", "b").await.expect("a->b");
    rbac.add_role_inheritance("b", "c").await.expect("b->c");
    rbac.add_role_inheritance("c", "a").await.expect("c->a");
    rbac.add_permission("c", "doc", "read", Effect::Allow).await.expect("rule");
    rbac.add_role_for_user("u1", "a", None).await.expect("grant");

    assert!(rbac.check_permission("u1", "doc", "read", None).await.expect("check"));
    assert!(!rbac.check_permission("u1", "doc", "write", None).await.expect("check"));

    let mut implicit = rbac
        .get_implicit_roles_for_user("u1", None)
        .await
        .expect("implicit");
    implicit.sort();
    assert_eq!(implicit, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn tenant_assignments_do_not_leak() {
    let rbac = engine();
    rbac.add_permission("admin", "billing", "manage", Effect::Allow)
        .await
        .expect("rule");
    rbac.add_role_for_user("u1", "admin", Some("t1")).await.expect("grant");

    assert!(rbac.check_permission("u1", "billing", "manage", Some("t1")).await.expect("t1"));
    assert!(!rbac.check_permission("u1", "billing", "manage", Some("t2")).await.expect("t2"));
    assert!(!rbac.check_permission("u1", "billing", "manage", None).await.expect("global"));

    assert_eq!(
        rbac.get_roles_for_user("u1", Some("t1")).await.expect("roles"),
        vec!["admin"]
    );
    assert!(rbac.get_roles_for_user("u1", Some("t2")).await.expect("roles").is_empty());
}

#[tokio::test]
async fn grants_are_idempotent_and_removable() {
    let rbac = engine();
    assert!(rbac.add_role_for_user("u1", "viewer", None).await.expect("first"));
    assert!(!rbac.add_role_for_user("u1", "viewer", None).await.expect("second"));
    assert_eq!(rbac.get_users_for_role("viewer").await.expect("users"), vec!["u1"]);

    assert!(rbac.delete_role_for_user("u1", "viewer", None).await.expect("delete"));
    assert!(!rbac.delete_role_for_user("u1", "viewer", None).await.expect("again"));
    assert!(rbac.get_users_for_role("viewer").await.expect("users").is_empty());
}

#[tokio::test]
async fn deleting_a_role_drops_its_rules_and_grants() {
    let rbac = engine();
    rbac.add_permission("editor", "doc", "write", Effect::Allow).await.expect("rule");
    rbac.add_role_inheritance("editor", "viewer").await.expect("inherit");
    rbac.add_role_for_user("u1", "editor", None).await.expect("grant");

    rbac.delete_role("editor").await.expect("delete");

    assert!(!rbac.check_permission("u1", "doc", "write", None).await.expect("check"));
    assert!(rbac.get_roles_for_user("u1", None).await.expect("roles").is_empty());
    assert!(
        rbac.get_effective_permissions(&["editor".to_string()])
            .await
            .expect("perms")
            .is_empty()
    );
}

#[tokio::test]
async fn effective_permissions_keep_one_entry_per_pair() {
    let rbac = engine();
    rbac.add_permission("viewer", "doc", "read", Effect::Allow).await.expect("rule");
    rbac.add_permission("editor", "doc", "write", Effect::Allow).await.expect("rule");
    rbac.add_permission("editor", "doc", "read", Effect::Deny).await.expect("rule");
    rbac.add_role_inheritance("editor", "viewer").await.expect("inherit");

    let perms = rbac
        .get_effective_permissions(&["editor".to_string()])
        .await
        .expect("perms");

    let reads: Vec<_> = perms.iter().filter(|p| p.action == "read").collect();
    assert_eq!(reads.len(), 1);
    assert_eq!(perms.len(), 2);
}

#[tokio::test]
async fn removed_permission_no_longer_grants() {
    let rbac = engine();
    rbac.add_permission("u1", "doc", "read", Effect::Allow).await.expect("rule");
    assert!(rbac.check_permission("u1", "doc", "read", None).await.expect("check"));

    assert!(
        rbac.remove_permission("u1", "doc", "read", Effect::Allow)
            .await
            .expect("remove")
    );
    assert!(!rbac.check_permission("u1", "doc", "read", None).await.expect("check"));
}

#[tokio::test]
async fn authorize_uses_the_context_tenant() {
    let rbac = engine();
    rbac.add_permission("editor", "doc", "write", Effect::Allow).await.expect("rule");
    rbac.add_role_for_user("u1", "editor", Some("t1")).await.expect("grant");

    let mut ctx = AuthContext::new("u1", CredentialKind::Token);
    ctx.tenant_id = Some("t1".into());
    rbac.authorize(&ctx, "doc", "write").await.expect("allowed");

    ctx.tenant_id = Some("t2".into());
    let err = rbac.authorize(&ctx, "doc", "write").await.expect_err("denied");
    assert!(matches!(err, AuthError::Authorization(_)));
    assert_eq!(err.to_string(), "permission denied: write on doc");
}

#[tokio::test]
async fn blank_identifiers_are_rejected_on_write() {
    let rbac = engine();
    assert!(matches!(
        rbac.add_permission("", "doc", "read", Effect::Allow).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        rbac.add_role_for_user("u1", " ", None).await,
        Err(AuthError::Validation(_))
    ));
}
