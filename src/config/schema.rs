//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Root configuration for the request gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Credential verification settings.
    pub auth: AuthConfig,

    /// Session cache settings.
    pub session: SessionConfig,

    /// Shared store backend.
    pub store: StoreConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Permission table overrides.
    pub authz: AuthzConfig,

    /// Activity logger settings.
    pub activity: ActivityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,

    pub admin: AdminConfig,

    /// Principals seeded into the bundled in-memory principal store.
    pub principals: Vec<SeedPrincipal>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds.
    pub request_secs: u64,

    /// Deadline for a single shared-store round trip in milliseconds.
    pub store_ms: u64,

    /// Deadline for a principal store lookup in milliseconds.
    pub principal_lookup_ms: u64,

    /// Grace period for draining in-flight requests on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            store_ms: 250,
            principal_lookup_ms: 2000,
            shutdown_grace_secs: 10,
        }
    }
}

/// Bearer-token and API-key settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Overridden by `GATE_JWT_SECRET`.
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` claim.
    pub audience: String,

    /// Lifetime of issued tokens in seconds.
    pub token_ttl_secs: u64,

    /// Service keys accepted through `X-API-Key`.
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "cms-backend".to_string(),
            audience: "cms-api".to_string(),
            token_ttl_secs: 7 * 24 * 3600,
            api_keys: Vec::new(),
        }
    }
}

/// A service API key, stored as the SHA-256 hex digest of the key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    /// Service name; the principal id becomes `service:<name>`.
    pub name: String,

    /// Lowercase hex SHA-256 of the key (`gate-cli hash-key <key>`).
    pub key_sha256: String,
}

/// Session cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Snapshot lifetime in seconds.
    pub ttl_secs: u64,

    /// Store key prefix.
    pub key_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            key_prefix: "session".to_string(),
        }
    }
}

/// Shared store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Connection URL when `backend = "redis"`. Overridden by `GATE_REDIS_URL`.
    pub redis_url: String,

    /// Janitor interval for the memory backend, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. When off, every check is allowed without touching the store.
    pub enabled: bool,

    /// Store key prefix for counters.
    pub key_prefix: String,

    /// Per-policy overrides keyed by policy name (`strict`, `contact_intake`, ...).
    pub policies: BTreeMap<String, PolicyOverride>,

    /// Per-role limits for the `adaptive` policy.
    pub adaptive: AdaptiveLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "rl".to_string(),
            policies: BTreeMap::new(),
            adaptive: AdaptiveLimits::default(),
        }
    }
}

/// Override for one named policy. Unset fields keep the built-in value.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyOverride {
    pub window_secs: Option<u64>,
    pub max: Option<u64>,
    pub message: Option<String>,
}

/// Requests per window for the `adaptive` policy, by caller kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptiveLimits {
    pub anonymous: u64,
    pub viewer: u64,
    pub editor: u64,
    pub admin: u64,
    pub api: u64,
}

impl Default for AdaptiveLimits {
    fn default() -> Self {
        Self {
            anonymous: 60,
            viewer: 60,
            editor: 120,
            admin: 300,
            api: 300,
        }
    }
}

/// Permission table overrides: role name → allowed actions.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthzConfig {
    pub permissions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Buffered events before new ones are dropped.
    pub channel_capacity: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Use the first `X-Forwarded-For` hop as the client address.
    pub trust_forwarded_for: bool,
    /// Include internal error detail (e.g. the unmet permission) in responses.
    pub expose_error_details: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            trust_forwarded_for: false,
            expose_error_details: false,
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Principal record loaded into the bundled in-memory principal store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedPrincipal {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
