//! Shared utilities for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use request_gate::activity::ActivityLogger;
use request_gate::auth::{
    hash_key, InMemoryPrincipalStore, Principal, PrincipalId, PrincipalStore, Role, TokenVerifier,
};
use request_gate::config::{ApiKeyConfig, GateConfig, SeedPrincipal};
use request_gate::store::memory::MemoryStore;
use request_gate::store::{SharedStore, StoreError, WindowCount};
use request_gate::{GateServer, GateState};

pub const SECRET: &str = "integration-secret-integration-secret-0123";
pub const SERVICE_KEY: &str = "svc-live-key-0001";

fn seed(id: &str, role: Role) -> SeedPrincipal {
    SeedPrincipal {
        id: id.to_string(),
        email: format!("{id}@cms.test"),
        role,
        active: true,
    }
}

/// Config with a signing secret, one service key and a handful of principals.
pub fn config() -> GateConfig {
    let mut config = GateConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.auth.api_keys.push(ApiKeyConfig {
        name: "importer".to_string(),
        key_sha256: hash_key(SERVICE_KEY),
    });
    config.principals = vec![
        seed("admin-1", Role::Admin),
        seed("admin-2", Role::Admin),
        seed("editor-1", Role::Editor),
        seed("viewer-1", Role::Viewer),
    ];
    config
}

/// A running gate: state plus the fully layered router.
pub struct TestGate {
    pub config: GateConfig,
    pub state: GateState,
    pub router: Router,
}

impl TestGate {
    pub fn new(config: GateConfig) -> Self {
        Self::build(config, Arc::new(MemoryStore::new()), |_| Router::new())
    }

    pub fn with_store(config: GateConfig, store: Arc<dyn SharedStore>) -> Self {
        Self::build(config, store, |_| Router::new())
    }

    pub fn with_principals(config: GateConfig, principals: Arc<dyn PrincipalStore>) -> Self {
        Self::assemble(config, Arc::new(MemoryStore::new()), principals, |_| Router::new())
    }

    /// Gate with extra application routes built against its state.
    pub fn build(
        config: GateConfig,
        store: Arc<dyn SharedStore>,
        app: impl FnOnce(GateState) -> Router<GateState>,
    ) -> Self {
        let principals = Arc::new(InMemoryPrincipalStore::from_seed(&config.principals));
        Self::assemble(config, store, principals, app)
    }

    fn assemble(
        config: GateConfig,
        store: Arc<dyn SharedStore>,
        principals: Arc<dyn PrincipalStore>,
        app: impl FnOnce(GateState) -> Router<GateState>,
    ) -> Self {
        let state = GateState::new(&config, store, principals, ActivityLogger::disabled());
        let routes = app(state.clone());
        let router = GateServer::with_routes(&config, state.clone(), routes).router();
        Self { config, state, router }
    }

    /// Bearer token for a seeded principal, signed with the configured secret.
    pub fn token_for(&self, id: &str) -> String {
        let principal = Principal::new(id, format!("{id}@cms.test"), Role::Viewer);
        self.sign(&principal)
    }

    pub fn sign(&self, principal: &Principal) -> String {
        TokenVerifier::new(&self.config.auth)
            .issue(principal)
            .expect("token signs")
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send(&self.router, request).await
    }
}

/// Request from `addr` with optional bearer token.
pub fn request(method: Method, uri: &str, token: Option<&str>, addr: SocketAddr) -> Request<Body> {
    request_with_body(method, uri, token, addr, Body::empty())
}

pub fn request_with_body(
    method: Method,
    uri: &str,
    token: Option<&str>,
    addr: SocketAddr,
    body: Body,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let mut request = builder
        .header("content-type", "application/json")
        .body(body)
        .expect("valid request");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub fn addr(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 40000))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn error_kind(&self) -> Option<&str> {
        self.body["error"]["kind"].as_str()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse { status, headers, body }
}

/// A store whose every call fails.
pub struct DownStore;

#[async_trait]
impl SharedStore for DownStore {
    async fn incr_window(&self, _key: &str, _window: Duration) -> Result<WindowCount, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn bump(&self, _key: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_ex_if(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
        _guard: &str,
        _expected: u64,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn backend(&self) -> &'static str {
        "down"
    }
}

/// A principal store that never answers in time.
pub struct StalledPrincipals;

#[async_trait]
impl PrincipalStore for StalledPrincipals {
    async fn find_by_id(&self, _id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        std::future::pending().await
    }

    async fn update_role(&self, _id: &PrincipalId, _role: Role) -> Result<Option<Principal>, StoreError> {
        std::future::pending().await
    }

    async fn set_active(&self, _id: &PrincipalId, _active: bool) -> Result<Option<Principal>, StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _id: &PrincipalId) -> Result<bool, StoreError> {
        std::future::pending().await
    }
}

/// A principal store that errors on every call.
pub struct UnreachablePrincipals;

#[async_trait]
impl PrincipalStore for UnreachablePrincipals {
    async fn find_by_id(&self, _id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("user database offline".into()))
    }

    async fn update_role(&self, _id: &PrincipalId, _role: Role) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("user database offline".into()))
    }

    async fn set_active(&self, _id: &PrincipalId, _active: bool) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("user database offline".into()))
    }

    async fn delete(&self, _id: &PrincipalId) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("user database offline".into()))
    }
}
