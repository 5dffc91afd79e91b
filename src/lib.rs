//! Request gate library: authentication, role authorization and adaptive
//! rate limiting in front of CMS route handlers.

pub mod config;
pub mod error;
pub mod http;
pub mod store;

// Request gating
pub mod auth;
pub mod authz;
pub mod ratelimit;

// Cross-cutting concerns
pub mod activity;
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::GateConfig;
pub use error::{ApiError, ErrorKind};
pub use http::{GateServer, GateState, GuardBuilder};
pub use lifecycle::Shutdown;
