//! Behavior when the shared store or the principal store misbehaves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use request_gate::ratelimit::PolicyName;
use request_gate::store::{SharedStore, StoreError, WindowCount};
use request_gate::{GateState, GuardBuilder};

mod common;
use common::{
    addr, config, request, request_with_body, DownStore, StalledPrincipals, TestGate,
    UnreachablePrincipals,
};

/// A store that accepts calls and never answers.
struct HangingStore;

#[async_trait]
impl SharedStore for HangingStore {
    async fn incr_window(&self, _key: &str, _window: Duration) -> Result<WindowCount, StoreError> {
        std::future::pending().await
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        std::future::pending().await
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn bump(&self, _key: &str) -> Result<u64, StoreError> {
        std::future::pending().await
    }

    async fn set_ex_if(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
        _guard: &str,
        _expected: u64,
    ) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        std::future::pending().await
    }

    fn backend(&self) -> &'static str {
        "hanging"
    }
}

fn strict_routes(state: GateState) -> Router<GateState> {
    GuardBuilder::new(state)
        .limit(PolicyName::Strict)
        .build()
        .apply(Router::new().route("/login-attempt", get(|| async { "ok" })))
}

#[tokio::test]
async fn store_outage_fails_open() {
    let gate = TestGate::build(config(), Arc::new(DownStore), strict_routes);

    for _ in 0..10 {
        let res = gate.send(request(Method::GET, "/login-attempt", None, addr(1))).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("ratelimit-remaining"), Some("5"));
    }
}

#[tokio::test]
async fn store_outage_bypasses_session_cache() {
    let gate = TestGate::with_store(config(), Arc::new(DownStore));
    let viewer = gate.token_for("viewer-1");

    let res = gate.send(request(Method::GET, "/auth/me", Some(&viewer), addr(1))).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["id"], "viewer-1");
}

#[tokio::test]
async fn health_reports_degraded_store() {
    let gate = TestGate::with_store(config(), Arc::new(DownStore));

    let res = gate.send(request(Method::GET, "/health", None, addr(1))).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "degraded");
    assert_eq!(res.body["store_reachable"], false);
}

#[tokio::test]
async fn hanging_store_is_cut_off_by_deadline() {
    let mut config = config();
    config.timeouts.store_ms = 50;
    let gate = TestGate::with_store(config, Arc::new(HangingStore));
    let editor = gate.token_for("editor-1");

    let res = tokio::time::timeout(
        Duration::from_secs(5),
        gate.send(request(Method::GET, "/auth/me", Some(&editor), addr(1))),
    )
    .await
    .expect("gate answered before the outer timeout");

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["role"], "editor");
}

#[tokio::test]
async fn failed_session_invalidation_after_mutation_is_reported() {
    let gate = TestGate::with_store(config(), Arc::new(DownStore));
    let admin = gate.token_for("admin-1");

    let res = gate
        .send(request_with_body(
            Method::PATCH,
            "/admin/users/viewer-1/role",
            Some(&admin),
            addr(1),
            Body::from(json!({ "role": "editor" }).to_string()),
        ))
        .await;

    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.error_kind(), Some("ServiceUnavailable"));
    assert!(res.body["error"].get("detail").is_none());
}

#[tokio::test]
async fn principal_store_outage_is_service_unavailable() {
    let gate = TestGate::with_principals(config(), Arc::new(UnreachablePrincipals));
    let viewer = gate.token_for("viewer-1");

    let res = gate.send(request(Method::GET, "/auth/me", Some(&viewer), addr(1))).await;

    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.error_kind(), Some("ServiceUnavailable"));
}

#[tokio::test]
async fn stalled_principal_lookup_times_out() {
    let mut config = config();
    config.timeouts.principal_lookup_ms = 50;
    let gate = TestGate::with_principals(config, Arc::new(StalledPrincipals));
    let viewer = gate.token_for("viewer-1");

    let res = tokio::time::timeout(
        Duration::from_secs(5),
        gate.send(request(Method::GET, "/auth/me", Some(&viewer), addr(1))),
    )
    .await
    .expect("gate answered before the outer timeout");

    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn exposed_details_stay_off_server_errors() {
    let mut config = config();
    config.security.expose_error_details = true;
    let gate = TestGate::with_principals(config, Arc::new(UnreachablePrincipals));
    let viewer = gate.token_for("viewer-1");

    let res = gate.send(request(Method::GET, "/auth/me", Some(&viewer), addr(1))).await;
    assert!(res.body["error"].get("detail").is_none());

    let res = gate.send(request(Method::GET, "/auth/me", Some("garbage"), addr(1))).await;
    assert_eq!(res.error_kind(), Some("InvalidToken"));
    assert!(res.body["error"]["detail"].is_string());
}
