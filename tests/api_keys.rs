mod common;

use chrono::Duration;

use authcore::config::ApiKeyConfig;
use authcore::error::AuthError;
use authcore::services::api_keys::{
    ApiKeyStatus, ApiKeyUpdate, CreateApiKeyRequest, RateLimit, RateWindow,
};
use authcore::services::auth::codec::hash_secret;
use authcore::services::auth::{CredentialKind, RequestContext};

use common::{Harness, harness, harness_with, scopes, test_config};

fn request(owner: &str) -> CreateApiKeyRequest {
    CreateApiKeyRequest {
        owner_id: owner.to_string(),
        tenant_id: Some("t1".to_string()),
        name: "ci".to_string(),
        scopes: scopes(&["read:users"]),
        ..CreateApiKeyRequest::default()
    }
}

fn https() -> RequestContext {
    RequestContext::new(Some("10.1.2.3".parse().expect("ip")), true)
}

#[tokio::test]
async fn only_the_hash_of_a_new_key_is_stored() {
    let Harness { core, .. } = harness();
    let created = core.api_keys.create_api_key(request("u1")).await.expect("create");

    assert!(created.secret.starts_with("ak_"));
    assert_eq!(created.key.prefix, created.secret[..12]);
    assert_eq!(created.key.key_hash, hash_secret(&created.secret));
    assert_eq!(created.key.status, ApiKeyStatus::Active);
    assert!(!format!("{created:?}").contains(&created.secret));

    let stored = core.api_keys.get_api_key(&created.key.id).await.expect("get");
    let json = serde_json::to_string(&stored).expect("serialize");
    assert!(!json.contains(&created.secret));
}

#[tokio::test]
async fn authenticated_key_yields_owner_context_and_counts_usage() {
    let Harness { core, .. } = harness();
    let created = core.api_keys.create_api_key(request("u1")).await.expect("create");

    let ctx = core
        .api_keys
        .authenticate_api_key(&created.secret, &https())
        .await
        .expect("authenticate");
    assert_eq!(ctx.subject, "u1");
    assert_eq!(ctx.kind, CredentialKind::ApiKey);
    assert_eq!(ctx.tenant_id.as_deref(), Some("t1"));
    assert_eq!(ctx.credential_id.as_deref(), Some(created.key.id.as_str()));
    assert!(ctx.has_scope("read:users"));

    let stored = core.api_keys.get_api_key(&created.key.id).await.expect("get");
    assert_eq!(stored.total_requests, 1);
    assert_eq!(stored.failed_requests, 0);
    assert!(stored.last_used_at.is_some());
}

#[tokio::test]
async fn unknown_key_is_rejected_and_audited_without_hint() {
    let Harness { core, audit, .. } = harness();

    let err = core
        .api_keys
        .authenticate_api_key("ak_not-a-real-key", &https())
        .await
        .expect_err("unknown key");
    assert!(matches!(err, AuthError::Authentication("Invalid API key")));

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, CredentialKind::ApiKey);
    assert!(events[0].credential_hint.is_none());
    assert!(!events[0].reason.contains("not-a-real-key"));
}

#[tokio::test]
async fn creation_validates_scopes_and_inputs() {
    let Harness { core, .. } = harness();

    let unknown = CreateApiKeyRequest {
        scopes: scopes(&["read:users", "launch:missiles"]),
        ..request("u1")
    };
    let err = core.api_keys.create_api_key(unknown).await.expect_err("unknown scope");
    assert_eq!(err.to_string(), "validation error: unknown scope: launch:missiles");

    let empty = CreateApiKeyRequest {
        scopes: Vec::new(),
        ..request("u1")
    };
    assert!(matches!(
        core.api_keys.create_api_key(empty).await,
        Err(AuthError::Validation(_))
    ));

    let bad_ip = CreateApiKeyRequest {
        allowed_ips: Some(vec!["10.0.0.0/33".to_string()]),
        ..request("u1")
    };
    assert!(matches!(
        core.api_keys.create_api_key(bad_ip).await,
        Err(AuthError::Validation(_))
    ));

    let zero_quota = CreateApiKeyRequest {
        rate_limit: Some(RateLimit::new(0, RateWindow::Minute)),
        ..request("u1")
    };
    assert!(matches!(
        core.api_keys.create_api_key(zero_quota).await,
        Err(AuthError::Validation(_))
    ));
}

#[tokio::test]
async fn active_key_cap_is_per_owner() {
    let mut config = test_config();
    config.api_keys = ApiKeyConfig {
        max_active_per_owner: 2,
        ..ApiKeyConfig::default()
    };
    let Harness { core, .. } = harness_with(config);

    let first = core.api_keys.create_api_key(request("u1")).await.expect("1");
    core.api_keys.create_api_key(request("u1")).await.expect("2");
    assert!(matches!(
        core.api_keys.create_api_key(request("u1")).await,
        Err(AuthError::Validation(_))
    ));
    core.api_keys
        .create_api_key(request("u2"))
        .await
        .expect("other owner unaffected");

    core.api_keys.revoke_api_key(&first.key.id).await.expect("revoke");
    core.api_keys
        .create_api_key(request("u1"))
        .await
        .expect("slot freed by revocation");
    assert_eq!(core.api_keys.list_api_keys("u1").await.expect("list").len(), 3);
}

#[tokio::test]
async fn suspension_is_reversible_and_revocation_is_not() {
    let Harness { core, .. } = harness();
    let created = core.api_keys.create_api_key(request("u1")).await.expect("create");
    let id = created.key.id.clone();

    core.api_keys.suspend_api_key(&id).await.expect("suspend");
    assert!(matches!(
        core.api_keys.authenticate_api_key(&created.secret, &https()).await,
        Err(AuthError::Authentication("API key is suspended"))
    ));

    core.api_keys.reactivate_api_key(&id).await.expect("reactivate");
    core.api_keys
        .authenticate_api_key(&created.secret, &https())
        .await
        .expect("active again");
    assert!(matches!(
        core.api_keys.reactivate_api_key(&id).await,
        Err(AuthError::Validation(_))
    ));

    let revoked = core.api_keys.revoke_api_key(&id).await.expect("revoke");
    assert!(revoked.revoked_at.is_some());
    let again = core.api_keys.revoke_api_key(&id).await.expect("idempotent");
    assert_eq!(again.revoked_at, revoked.revoked_at);

    assert!(matches!(
        core.api_keys.authenticate_api_key(&created.secret, &https()).await,
        Err(AuthError::Authentication("API key has been revoked"))
    ));
    assert!(matches!(
        core.api_keys.reactivate_api_key(&id).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        core.api_keys.suspend_api_key(&id).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        core.api_keys
            .update_api_key(&id, ApiKeyUpdate {
                name: Some("renamed".into()),
                ..ApiKeyUpdate::default()
            })
            .await,
        Err(AuthError::Validation(_))
    ));
}

#[tokio::test]
async fn expired_key_is_marked_and_counted_as_failure() {
    let Harness { core, clock, audit } = harness();
    let created = core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            expires_in_days: Some(1),
            ..request("u1")
        })
        .await
        .expect("create");

    clock.advance(Duration::days(1));
    assert!(matches!(
        core.api_keys.authenticate_api_key(&created.secret, &https()).await,
        Err(AuthError::Authentication("API key has expired"))
    ));

    let stored = core.api_keys.get_api_key(&created.key.id).await.expect("get");
    assert_eq!(stored.status, ApiKeyStatus::Expired);
    assert_eq!(stored.failed_requests, 1);
    assert_eq!(
        audit.events()[0].credential_hint.as_deref(),
        Some(created.key.prefix.as_str())
    );
}

#[tokio::test]
async fn allowlist_and_transport_gates() {
    let Harness { core, .. } = harness();
    let created = core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            allowed_ips: Some(vec!["10.0.0.0/8".into(), "192.0.2.7".into()]),
            require_https: true,
            ..request("u1")
        })
        .await
        .expect("create");

    core.api_keys
        .authenticate_api_key(&created.secret, &https())
        .await
        .expect("inside the block");
    core.api_keys
        .authenticate_api_key(
            &created.secret,
            &RequestContext::new(Some("192.0.2.7".parse().expect("ip")), true),
        )
        .await
        .expect("exact match");

    let outside = RequestContext::new(Some("198.51.100.1".parse().expect("ip")), true);
    assert!(matches!(
        core.api_keys.authenticate_api_key(&created.secret, &outside).await,
        Err(AuthError::Authentication("IP address not allowed"))
    ));
    assert!(matches!(
        core.api_keys
            .authenticate_api_key(&created.secret, &RequestContext::new(None, true))
            .await,
        Err(AuthError::Authentication("IP address not allowed"))
    ));

    let plain = RequestContext::new(Some("10.9.9.9".parse().expect("ip")), false);
    assert!(matches!(
        core.api_keys.authenticate_api_key(&created.secret, &plain).await,
        Err(AuthError::Authentication("HTTPS required"))
    ));
}

#[tokio::test]
async fn quota_is_enforced_per_window() {
    let Harness { core, clock, audit } = harness();
    let created = core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            rate_limit: Some(RateLimit::new(2, RateWindow::Minute)),
            ..request("u1")
        })
        .await
        .expect("create");

    clock.advance(Duration::seconds(15));
    for _ in 0..2 {
        core.api_keys
            .authenticate_api_key(&created.secret, &https())
            .await
            .expect("within quota");
    }
    match core.api_keys.authenticate_api_key(&created.secret, &https()).await {
        Err(AuthError::RateLimited {
            limit,
            remaining,
            retry_after_secs,
        }) => {
            assert_eq!(limit, 2);
            assert_eq!(remaining, 0);
            assert_eq!(retry_after_secs, 45);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(audit.events().len(), 1);

    clock.advance(Duration::seconds(45));
    core.api_keys
        .authenticate_api_key(&created.secret, &https())
        .await
        .expect("next window");
}

#[tokio::test]
async fn rotation_keeps_settings_and_retires_the_old_secret() {
    let mut config = test_config();
    config.api_keys = ApiKeyConfig {
        max_active_per_owner: 1,
        ..ApiKeyConfig::default()
    };
    let Harness { core, .. } = harness_with(config);
    let old = core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            scopes: scopes(&["read:users", "write:users"]),
            rate_limit: Some(RateLimit::new(50, RateWindow::Hour)),
            ..request("u1")
        })
        .await
        .expect("create");

    let rotated = core.api_keys.rotate_api_key(&old.key.id).await.expect("rotate");
    assert_ne!(rotated.key.id, old.key.id);
    assert_ne!(rotated.secret, old.secret);
    assert_eq!(rotated.key.scopes, old.key.scopes);
    assert_eq!(rotated.key.rate_limit, old.key.rate_limit);
    assert_eq!(rotated.key.name, old.key.name);

    assert!(matches!(
        core.api_keys.authenticate_api_key(&old.secret, &https()).await,
        Err(AuthError::Authentication("API key has been revoked"))
    ));
    core.api_keys
        .authenticate_api_key(&rotated.secret, &https())
        .await
        .expect("new secret works");
}

#[tokio::test]
async fn updates_apply_and_are_validated() {
    let Harness { core, .. } = harness();
    let created = core.api_keys.create_api_key(request("u1")).await.expect("create");

    let updated = core
        .api_keys
        .update_api_key(
            &created.key.id,
            ApiKeyUpdate {
                scopes: Some(scopes(&["read:keys"])),
                ..ApiKeyUpdate::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.scopes, scopes(&["read:keys"]));

    assert!(matches!(
        core.api_keys
            .update_api_key(
                &created.key.id,
                ApiKeyUpdate {
                    scopes: Some(scopes(&["everything"])),
                    ..ApiKeyUpdate::default()
                },
            )
            .await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        core.api_keys.update_api_key("missing", ApiKeyUpdate::default()).await,
        Err(AuthError::NotFound(_))
    ));
}

#[tokio::test]
async fn scope_check_requires_containment_and_tenant() {
    let Harness { core, .. } = harness();
    let created = core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            scopes: scopes(&["read:users", "admin"]),
            ..request("u1")
        })
        .await
        .expect("create");
    let ctx = core
        .api_keys
        .authenticate_api_key(&created.secret, &https())
        .await
        .expect("authenticate");

    assert!(core.api_keys.check_permission(&ctx, "read:users", None));
    assert!(core.api_keys.check_permission(&ctx, "read:users", Some("t1")));
    assert!(!core.api_keys.check_permission(&ctx, "read:users", Some("t2")));
    // admin is a scope of its own, not a superset
    assert!(!core.api_keys.check_permission(&ctx, "write:users", None));
}
