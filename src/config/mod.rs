//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, env overrides for secrets)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → consumed once at startup to build the gate components
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; rate-limit policies are fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ActivityConfig, AdaptiveLimits, AdminConfig, ApiKeyConfig, AuthConfig, AuthzConfig, GateConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, PolicyOverride, RateLimitConfig,
    SecurityConfig, SeedPrincipal, SessionConfig, StoreBackend, StoreConfig, TimeoutConfig,
    TlsConfig,
};
