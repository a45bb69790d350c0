//! Router-level tests: credential extraction, status mapping and headers.
mod common;

use std::net::SocketAddr;

use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use axum::extract::ConnectInfo;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use authcore::app::build_router;
use authcore::services::api_keys::types::IpRule;
use authcore::services::api_keys::{CreateApiKeyRequest, RateLimit, RateWindow};
use authcore::services::auth::AccessTokenOptions;
use authcore::services::rbac::Effect;
use authcore::services::sessions::NewSession;
use authcore::state::AppState;

use common::{Harness, harness, scopes};

fn router(h: &Harness) -> Router {
    build_router(AppState::new(h.core.clone()))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn access_token(h: &Harness, subject: &str) -> String {
    h.core
        .tokens
        .issue_access_token(subject, AccessTokenOptions::with_scopes(["read:users"]))
        .await
        .expect("issue")
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let h = harness();
    let response = router(&h)
        .oneshot(get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn bearer_token_reaches_the_handler() {
    let h = harness();
    let token = access_token(&h, "u1").await;

    let response = router(&h)
        .oneshot(
            get("/api/v1/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["subject"], "u1");
    assert_eq!(body["kind"], "token");
    assert_eq!(body["scopes"], json!(["read:users"]));
}

#[tokio::test]
async fn missing_credentials_are_unauthorized() {
    let h = harness();
    let response = router(&h)
        .oneshot(get("/api/v1/me").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTHENTICATION_FAILED");
    assert_eq!(body["error"]["message"], "missing credentials");
}

#[tokio::test]
async fn two_different_credentials_are_rejected() {
    let h = harness();
    let token = access_token(&h, "u1").await;

    let response = router(&h)
        .oneshot(
            get("/api/v1/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header("x-api-key", "ak_something-else")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["message"], "multiple credentials presented");
}

#[tokio::test]
async fn expired_token_maps_to_its_own_code() {
    let h = harness();
    let token = h
        .core
        .tokens
        .issue_access_token("u1", AccessTokenOptions::default().ttl(0))
        .await
        .expect("issue");

    let response = router(&h)
        .oneshot(
            get("/api/v1/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn exhausted_api_key_gets_429_with_retry_after() {
    let h = harness();
    let created = h
        .core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            owner_id: "u1".into(),
            name: "ci".into(),
            scopes: scopes(&["read:users"]),
            rate_limit: Some(RateLimit::new(1, RateWindow::Minute)),
            ..CreateApiKeyRequest::default()
        })
        .await
        .expect("create");
    let app = router(&h);

    let request = || {
        get("/api/v1/me")
            .header("x-api-key", created.secret.as_str())
            .body(Body::empty())
            .expect("request")
    };

    let first = app.clone().oneshot(request()).await.expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["kind"], "api_key");

    let second = app.oneshot(request()).await.expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    // Clock sits at the start of a minute.
    assert_eq!(
        second
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("60")
    );
    assert_eq!(json_body(second).await["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn session_cookie_authenticates() {
    let h = harness();
    let session = h
        .core
        .sessions
        .create_session(NewSession::for_user("u3").tenant("t1"))
        .await
        .expect("session");

    let response = router(&h)
        .oneshot(
            get("/api/v1/me")
                .header(header::COOKIE, format!("theme=dark; session_id={}", session.id))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["subject"], "u3");
    assert_eq!(body["tenant_id"], "t1");
    assert_eq!(body["kind"], "session");
}

#[tokio::test]
async fn authorize_returns_403_on_deny() {
    let h = harness();
    h.core
        .rbac
        .add_permission("editor", "document", "write", Effect::Allow)
        .await
        .expect("permission");
    h.core
        .rbac
        .add_role_for_user("u1", "editor", None)
        .await
        .expect("grant");
    let token = access_token(&h, "u1").await;
    let app = router(&h);

    let mut allowed = post_json(
        "/api/v1/authorize",
        json!({"resource": "document", "action": "write"}),
    );
    allowed.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("header"),
    );
    let response = app.clone().oneshot(allowed).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["allowed"], true);

    let mut denied = post_json(
        "/api/v1/authorize",
        json!({"resource": "document", "action": "delete"}),
    );
    denied.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("header"),
    );
    let response = app.clone().oneshot(denied).await.expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut missing_scope = post_json(
        "/api/v1/authorize",
        json!({"resource": "document", "action": "write", "scope": "write:users"}),
    );
    missing_scope.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("header"),
    );
    let response = app.oneshot(missing_scope).await.expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refresh_grant_mints_a_new_access_token() {
    let h = harness();
    let pair = h
        .core
        .tokens
        .issue_token_pair("u1", AccessTokenOptions::default().tenant("t1"))
        .await
        .expect("pair");
    let app = router(&h);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/token",
            json!({"grant_type": "refresh_token", "refresh_token": pair.refresh_token, "scope": "read:users"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);

    let access = body["access_token"].as_str().expect("token").to_string();
    let me = app
        .clone()
        .oneshot(
            get("/api/v1/me")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let me = json_body(me).await;
    assert_eq!(me["tenant_id"], "t1");
    assert_eq!(me["scopes"], json!(["read:users"]));

    let response = app
        .oneshot(post_json(
            "/api/v1/token",
            json!({"grant_type": "password", "refresh_token": "x"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forwarded_headers_only_count_through_a_trusted_proxy() {
    let h = harness();
    let created = h
        .core
        .api_keys
        .create_api_key(CreateApiKeyRequest {
            owner_id: "u1".into(),
            name: "office".into(),
            scopes: scopes(&["read:users"]),
            allowed_ips: Some(vec!["203.0.113.7".into()]),
            require_https: true,
            ..CreateApiKeyRequest::default()
        })
        .await
        .expect("create");
    let proxy = "10.0.0.0/8".parse::<IpRule>().expect("rule");
    let app = build_router(AppState::new(h.core.clone()).with_trusted_proxies(vec![proxy]));

    let request = |peer: &str| {
        let mut req = get("/api/v1/me")
            .header("x-api-key", created.secret.as_str())
            .header("x-forwarded-for", "203.0.113.7")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .expect("request");
        let addr: SocketAddr = peer.parse().expect("peer");
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    };

    let spoofed = app
        .clone()
        .oneshot(request("198.51.100.9:5000"))
        .await
        .expect("response");
    assert_eq!(spoofed.status(), StatusCode::UNAUTHORIZED);

    let proxied = app
        .oneshot(request("10.0.0.2:5000"))
        .await
        .expect("response");
    assert_eq!(proxied.status(), StatusCode::OK);
}

#[tokio::test]
async fn forged_token_response_does_not_say_which_check_failed() {
    let h = harness();
    let token = access_token(&h, "u1").await;
    let (head, rest) = token.split_once('.').expect("header");
    let (_, signature) = rest.split_once('.').expect("payload");
    let payload = URL_SAFE_NO_PAD.encode(
        json!({"sub": "admin", "type": "access", "iat": 0, "exp": i64::MAX}).to_string(),
    );
    let forged = format!("{head}.{payload}.{signature}");

    let response = router(&h)
        .oneshot(
            get("/api/v1/me")
                .header(header::AUTHORIZATION, format!("Bearer {forged}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    assert_eq!(body["error"]["message"], "invalid token");

    let events = h.audit.events();
    assert!(events.iter().any(|e| e.reason.contains("signature mismatch")));
}
