//! API integration tests for passkeyd-server.
//!
//! These tests drive the router with genuine WebAuthn responses produced by
//! the software authenticator from `passkeyd-core`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use passkeyd_core::testing::{SoftAttestation, SoftAuthenticator};
use passkeyd_core::wire::{PublicKeyCredentialCreationOptions, PublicKeyCredentialRequestOptions};
use passkeyd_core::{RelyingParty, StaticTenantProvider, TenantConfig};
use passkeyd_server::{create_router, create_router_with_config, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    tenant_id: Uuid,
}

fn tenant() -> TenantConfig {
    TenantConfig::new(
        Uuid::new_v4(),
        "example.com",
        "Example",
        vec!["https://example.com".into()],
    )
}

/// Build the test router using the library's create_router function
fn create_test_app() -> TestApp {
    let tenant = tenant();
    let tenant_id = tenant.id;
    let tenants = StaticTenantProvider::new([tenant]).unwrap();
    let state = AppState::in_memory(RelyingParty::in_memory(Arc::new(tenants)));
    TestApp {
        router: create_router(state),
        tenant_id,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => {
                let bytes = serde_json::to_vec(&body).unwrap();
                builder
                    .header("Content-Type", "application/json")
                    .header("Content-Length", bytes.len())
                    .body(Body::from(bytes))
                    .unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn path(&self, suffix: &str) -> String {
        format!("/{}{}", self.tenant_id, suffix)
    }

    /// Run registration end to end, returning the finalize response
    async fn register(&self, auth: &mut SoftAuthenticator, user_id: &str) -> (StatusCode, Value) {
        let (status, init) = self
            .send(
                "POST",
                &self.path("/registration/initialize"),
                Some(json!({ "user_id": user_id, "username": format!("{user_id}@example.com") })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "init failed: {init}");

        let options: PublicKeyCredentialCreationOptions =
            serde_json::from_value(init["publicKey"].clone()).unwrap();
        let response = auth.register(&options);
        self.send(
            "POST",
            &self.path("/registration/finalize"),
            Some(serde_json::to_value(&response).unwrap()),
        )
        .await
    }

    async fn login_options(&self, user_id: Option<&str>) -> PublicKeyCredentialRequestOptions {
        let (status, init) = self
            .send(
                "POST",
                &self.path("/login/initialize"),
                Some(json!({ "user_id": user_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login init failed: {init}");
        serde_json::from_value(init["publicKey"].clone()).unwrap()
    }

    async fn login(&self, auth: &mut SoftAuthenticator, user_id: Option<&str>) -> (StatusCode, Value) {
        let options = self.login_options(user_id).await;
        let response = auth.authenticate(&options);
        self.send(
            "POST",
            &self.path("/login/finalize"),
            Some(serde_json::to_value(&response).unwrap()),
        )
        .await
    }
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = create_test_app();
    let (status, json) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage"], "memory");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_endpoint_returns_ok() {
    let app = create_test_app();
    let (status, json) = app.send("GET", "/ready", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_test_app();
    let (status, json) = app.send("GET", "/openapi.json", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/{tenant_id}/registration/initialize"].is_object());
}

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
async fn test_registration_issues_creation_options() {
    let app = create_test_app();
    let (status, json) = app
        .send(
            "POST",
            &app.path("/registration/initialize"),
            Some(json!({ "user_id": "alice", "username": "alice@example.com", "display_name": "Alice" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["sessionId"].is_string());
    let options = &json["publicKey"];
    assert_eq!(options["rp"]["id"], "example.com");
    assert_eq!(options["user"]["name"], "alice@example.com");
    assert_eq!(options["user"]["displayName"], "Alice");
    assert!(options["challenge"].as_str().unwrap().len() >= 22);
    assert!(options["pubKeyCredParams"].as_array().unwrap().len() >= 3);
    assert_eq!(options["excludeCredentials"], json!([]));
}

#[tokio::test]
async fn test_registration_finalize_returns_credential() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256().with_attestation(SoftAttestation::PackedSelf);

    let (status, json) = app.register(&mut auth, "alice").await;

    assert_eq!(status, StatusCode::OK, "finalize failed: {json}");
    assert_eq!(json["user_id"], "alice");
    assert_eq!(json["algorithm"], "ES256");
    assert_eq!(json["attestation_type"], "self");
    assert_eq!(json["sign_count"], 0);
    assert!(json["public_key"].is_string());
    assert!(json["created_at"].is_string());
}

#[tokio::test]
async fn test_registration_replay_is_rejected() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256();

    let (_, init) = app
        .send(
            "POST",
            &app.path("/registration/initialize"),
            Some(json!({ "user_id": "alice", "username": "alice" })),
        )
        .await;
    let options: PublicKeyCredentialCreationOptions =
        serde_json::from_value(init["publicKey"].clone()).unwrap();
    let response = serde_json::to_value(auth.register(&options)).unwrap();

    let (first, _) = app
        .send("POST", &app.path("/registration/finalize"), Some(response.clone()))
        .await;
    let (second, json) = app
        .send("POST", &app.path("/registration/finalize"), Some(response))
        .await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "CHALLENGE_EXPIRED");
}

#[tokio::test]
async fn test_duplicate_credential_is_conflict() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256();
    let (first, _) = app.register(&mut auth, "alice").await;
    assert_eq!(first, StatusCode::OK);

    let (status, json) = app.register(&mut auth, "bob").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert!(json["error"].is_string());

    let (_, listed) = app
        .send("GET", &app.path("/credentials?user_id=bob"), None)
        .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_malformed_json_uses_error_body() {
    let app = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri(app.path("/registration/initialize"))
        .header("Content-Type", "application/json")
        .body(Body::from("{\"user_id\": "))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_registration_from_foreign_origin_is_rejected() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256().with_origin("https://evil.example");

    let (status, json) = app.register(&mut auth, "alice").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "VERIFICATION_FAILED");
    // Verification details stay in the logs
    assert!(!json["error"].as_str().unwrap().contains("evil"));
}

#[tokio::test]
async fn test_registration_rejects_blank_user() {
    let app = create_test_app();
    let (status, json) = app
        .send(
            "POST",
            &app.path("/registration/initialize"),
            Some(json!({ "user_id": "  ", "username": "alice" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_unknown_tenant_is_not_found() {
    let app = create_test_app();
    let (status, json) = app
        .send(
            "POST",
            &format!("/{}/registration/initialize", Uuid::new_v4()),
            Some(json!({ "user_id": "alice", "username": "alice" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_tenant_id_is_rejected() {
    let app = create_test_app();
    let (status, _) = app
        .send(
            "POST",
            "/not-a-uuid/registration/initialize",
            Some(json!({ "user_id": "alice", "username": "alice" })),
        )
        .await;

    assert!(status.is_client_error());
}

// ============================================================================
// Login Tests
// ============================================================================

#[tokio::test]
async fn test_full_registration_and_login_flow() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::ed25519();

    let (status, _) = app.register(&mut auth, "bob").await;
    assert_eq!(status, StatusCode::OK);

    let options = app.login_options(Some("bob")).await;
    assert_eq!(options.rp_id, "example.com");
    assert_eq!(options.allow_credentials.len(), 1);
    assert_eq!(options.allow_credentials[0].id.as_bytes(), auth.credential_id());

    let response = auth.authenticate(&options);
    let (status, json) = app
        .send(
            "POST",
            &app.path("/login/finalize"),
            Some(serde_json::to_value(&response).unwrap()),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "login failed: {json}");
    assert_eq!(json["user_id"], "bob");
    assert_eq!(json["sign_count"], 1);
    assert!(json["last_used_at"].is_string());
}

#[tokio::test]
async fn test_discoverable_login() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256();
    app.register(&mut auth, "carol").await;

    let (status, json) = app.login(&mut auth, None).await;

    assert_eq!(status, StatusCode::OK, "login failed: {json}");
    assert_eq!(json["user_id"], "carol");
}

#[tokio::test]
async fn test_login_for_unknown_user_is_not_found() {
    let app = create_test_app();
    let (status, json) = app
        .send(
            "POST",
            &app.path("/login/initialize"),
            Some(json!({ "user_id": "nobody" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_counter_regression_is_clone_detected() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256().with_counter(5);
    app.register(&mut auth, "dave").await;

    let (status, json) = app.login(&mut auth, Some("dave")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sign_count"], 6);

    auth.set_counter(6);
    let (status, json) = app.login(&mut auth, Some("dave")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "CLONE_DETECTED");

    // The stored counter is untouched
    let (_, list) = app
        .send("GET", &app.path("/credentials?user_id=dave"), None)
        .await;
    assert_eq!(list[0]["sign_count"], 6);
}

#[tokio::test]
async fn test_login_with_deleted_credential_is_unknown() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256();
    let (_, credential) = app.register(&mut auth, "erin").await;

    // Issue a discoverable challenge, then remove the credential
    let options = app.login_options(None).await;
    let id = credential["id"].as_str().unwrap();
    let (status, _) = app
        .send("DELETE", &app.path(&format!("/credentials/{id}")), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let response = auth.authenticate(&options);
    let (status, json) = app
        .send(
            "POST",
            &app.path("/login/finalize"),
            Some(serde_json::to_value(&response).unwrap()),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNKNOWN_CREDENTIAL");
}

// ============================================================================
// Credential Management Tests
// ============================================================================

#[tokio::test]
async fn test_list_rename_and_delete_credentials() {
    let app = create_test_app();
    let mut first = SoftAuthenticator::es256();
    let mut second = SoftAuthenticator::ed25519();
    app.register(&mut first, "frank").await;
    app.register(&mut second, "frank").await;

    let (status, list) = app
        .send("GET", &app.path("/credentials?user_id=frank"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap().clone();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["algorithm"], "ES256");
    assert_eq!(list[1]["algorithm"], "EdDSA");

    let first_id = list[0]["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .send(
            "PATCH",
            &app.path(&format!("/credentials/{first_id}")),
            Some(json!({ "name": "  Laptop  " })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = app
        .send("GET", &app.path("/credentials?user_id=frank"), None)
        .await;
    assert_eq!(list[0]["name"], "Laptop");

    for _ in 0..2 {
        let (status, _) = app
            .send("DELETE", &app.path(&format!("/credentials/{first_id}")), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (_, list) = app
        .send("GET", &app.path("/credentials?user_id=frank"), None)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["algorithm"], "EdDSA");
}

#[tokio::test]
async fn test_rename_validation() {
    let app = create_test_app();
    let mut auth = SoftAuthenticator::es256();
    let (_, credential) = app.register(&mut auth, "gina").await;
    let id = credential["id"].as_str().unwrap();

    let (status, json) = app
        .send(
            "PATCH",
            &app.path(&format!("/credentials/{id}")),
            Some(json!({ "name": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");

    let (status, json) = app
        .send(
            "PATCH",
            &app.path("/credentials/AAAA"),
            Some(json!({ "name": "Phone" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, json) = app
        .send(
            "PATCH",
            &app.path("/credentials/%25%25"),
            Some(json!({ "name": "Phone" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_credentials_are_tenant_scoped() {
    let first = tenant();
    let second = TenantConfig::new(
        Uuid::new_v4(),
        "example.com",
        "Example Two",
        vec!["https://example.com".into()],
    );
    let (first_id, second_id) = (first.id, second.id);
    let tenants = StaticTenantProvider::new([first, second]).unwrap();
    let router = create_router(AppState::in_memory(RelyingParty::in_memory(Arc::new(
        tenants,
    ))));

    let app = TestApp {
        router: router.clone(),
        tenant_id: first_id,
    };
    let mut auth = SoftAuthenticator::es256();
    assert_eq!(app.register(&mut auth, "henry").await.0, StatusCode::OK);

    let other = TestApp {
        router,
        tenant_id: second_id,
    };
    let (status, list) = other
        .send("GET", &other.path("/credentials?user_id=henry"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

// ============================================================================
// Middleware Tests
// ============================================================================

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let tenant = tenant();
    let tenant_id = tenant.id;
    let tenants = StaticTenantProvider::new([tenant]).unwrap();
    let config = Config {
        body_limit_kb: 1,
        ..Config::default()
    };
    let app = TestApp {
        router: create_router_with_config(
            AppState::in_memory(RelyingParty::in_memory(Arc::new(tenants))),
            &config,
        ),
        tenant_id,
    };

    let (status, _) = app
        .send(
            "POST",
            &app.path("/registration/initialize"),
            Some(json!({ "user_id": "x".repeat(4096), "username": "alice" })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
