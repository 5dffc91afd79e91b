//! Request gate (v1)
//!
//! Authorization and adaptive rate limiting in front of CMS handlers.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ guard ─────────────────────────────▶ handler
//!                     (request id,    │ 1. address/field rate limits
//!                      trace, body    │ 2. authenticate (JWT | API key)
//!                      limit)         │      └─ session cache ─▶ principal store
//!                                     │ 3. role / permission checks
//!                                     │ 4. identity rate limits
//!                                     ▼
//!                               shared store (redis | memory)
//!
//!     Cross-cutting: config · observability · activity log · lifecycle
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use request_gate::activity::TracingSink;
use request_gate::auth::InMemoryPrincipalStore;
use request_gate::config::loader::apply_env_overrides;
use request_gate::config::validation::validate_config;
use request_gate::config::{load_config, ConfigError, GateConfig};
use request_gate::http::tls::load_tls_config;
use request_gate::lifecycle::{self, wait_for_signal};
use request_gate::observability::{logging::init_logging, metrics::init_metrics};
use request_gate::{GateServer, Shutdown};

#[derive(Parser)]
#[command(name = "request-gate")]
#[command(about = "Authorization and rate-limiting gate", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, generated_secret) = match &args.config {
        Some(path) => (load_config(path)?, false),
        None => development_config()?,
    };

    init_logging(&config.observability)?;
    tracing::info!("request-gate v{} starting", env!("CARGO_PKG_VERSION"));
    if generated_secret {
        tracing::warn!("No configuration file given; using a random signing secret. Tokens will not survive a restart.");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        store = ?config.store.backend,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let principals = Arc::new(InMemoryPrincipalStore::from_seed(&config.principals));
    tracing::info!(principals = principals.len(), "Principal store seeded");

    let gate = lifecycle::start(&config, principals, Arc::new(TracingSink), &shutdown).await?;
    let server = GateServer::new(&config, gate.state.clone());
    let grace = server.grace();

    let mut server_task = match &config.listener.tls {
        Some(tls) => {
            let rustls = load_tls_config(tls).await?;
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run_tls(addr, rustls, &shutdown).await })
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run(listener, &shutdown).await })
        }
    };

    let finished_early = tokio::select! {
        _ = wait_for_signal() => false,
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("Server exited before shutdown was requested"),
                Ok(Err(e)) => tracing::error!(error = %e, "Server failed"),
                Err(e) => tracing::error!(error = %e, "Server task panicked"),
            }
            true
        }
    };

    shutdown.trigger();
    if !finished_early {
        match tokio::time::timeout(grace, server_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server failed while draining"),
            Ok(Err(e)) => tracing::error!(error = %e, "Server task panicked"),
            Err(_) => tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed; dropping open connections"),
        }
    }

    gate.join().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Defaults plus environment overrides, with a throwaway secret when none is set.
fn development_config() -> Result<(GateConfig, bool), ConfigError> {
    let mut config = GateConfig::default();
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    let generated = config.auth.jwt_secret.is_empty();
    if generated {
        config.auth.jwt_secret = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok((config, generated))
}
