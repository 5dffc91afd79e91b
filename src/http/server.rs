//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the bundled routes and their guards
//! - Wire up router-wide middleware (request ID, tracing, metrics, limits)
//! - Serve plain TCP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::Request;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::guard::GuardBuilder;
use super::handlers;
use super::middleware::{render_errors, track_requests};
use super::request::{UuidRequestId, X_REQUEST_ID};
use super::state::GateState;
use crate::admin;
use crate::config::GateConfig;
use crate::lifecycle::Shutdown;

/// HTTP server for the request gate.
pub struct GateServer {
    router: Router,
    grace: Duration,
}

impl GateServer {
    pub fn new(config: &GateConfig, state: GateState) -> Self {
        Self::with_routes(config, state, Router::new())
    }

    /// Mount application routes (already wrapped in their guards) next to the bundled ones.
    pub fn with_routes(config: &GateConfig, state: GateState, app: Router<GateState>) -> Self {
        Self {
            router: Self::build_router(config, state, app),
            grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        }
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &GateConfig, state: GateState, app: Router<GateState>) -> Router {
        let public = GuardBuilder::public(state.clone())
            .build()
            .apply(Router::new().route("/health", get(handlers::health)));

        let authenticated = GuardBuilder::authenticated(state.clone()).build().apply(
            Router::new()
                .route("/auth/me", get(handlers::me))
                .route("/auth/logout", post(handlers::logout)),
        );

        let mut routes = Router::new().merge(public).merge(authenticated).merge(app);
        if config.admin.enabled {
            routes = routes.merge(admin::router(state.clone()));
        }

        routes
            .fallback(handlers::not_found)
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(state.settings.clone(), render_errors))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn(track_requests))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Serve on a plain TCP listener until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve TLS on `addr` until `shutdown` fires, then drain for the grace period.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let mut signal = shutdown.subscribe();
        let drain = handle.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            let _ = signal.recv().await;
            drain.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }
}
