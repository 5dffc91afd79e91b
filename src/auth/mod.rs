//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <jwt>          X-API-Key: <key>
//!     → token.rs (signature, exp, iss, aud)   → api_key.rs (sha256 + constant-time match)
//!     → principal id                          → service principal (role api)
//!     → session.rs (cache read-through)
//!     → principal.rs (PrincipalStore adapter)
//!     → live Principal attached to the request
//! ```
//!
//! # Design Decisions
//! - A token proves identity only; role and active flag always come from the store
//! - Session cache failures fall through to the principal store
//! - Principal store failures reject the request (fail closed)
//! - Deactivated principals are rejected even while holding a valid token

pub mod api_key;
pub mod authenticator;
pub mod principal;
pub mod session;
pub mod token;

use thiserror::Error;

pub use api_key::{hash_key, ApiKeyAuthenticator};
pub use authenticator::{has_credentials, AuthMethod, Authenticated, Authenticator};
pub use principal::{InMemoryPrincipalStore, Principal, PrincipalId, PrincipalStore, Role};
pub use session::SessionCache;
pub use token::{Claims, TokenVerifier};

use crate::error::ErrorKind;
use crate::store::StoreError;

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no bearer token provided")]
    NoToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("user not found")]
    UserNotFound,

    #[error("account deactivated")]
    AccountDeactivated,

    #[error("principal store unavailable: {0}")]
    Unavailable(String),

    #[error("session store error: {0}")]
    Session(#[source] StoreError),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Client-facing error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::NoToken => ErrorKind::NoToken,
            AuthError::InvalidToken | AuthError::InvalidApiKey => ErrorKind::InvalidToken,
            AuthError::TokenExpired => ErrorKind::TokenExpired,
            AuthError::UserNotFound => ErrorKind::UserNotFound,
            AuthError::AccountDeactivated => ErrorKind::AccountDeactivated,
            AuthError::Unavailable(_) | AuthError::Session(_) => ErrorKind::ServiceUnavailable,
            AuthError::Signing(_) => ErrorKind::InternalError,
        }
    }
}
