//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! live Principal + Requirement
//!     → authorizer.rs (active check, admin short-circuit, rank or table lookup)
//!     → permission.rs (per-role allow-list, defaults + config overrides)
//!     → Ok(()) | AuthzError
//!
//! admin mutation (actor, target, action)
//!     → self_guard.rs → Ok(()) | InvalidSelfOperation
//! ```
//!
//! # Design Decisions
//! - Admin satisfies every requirement without a table lookup
//! - `api` is its own lane: it never satisfies a role requirement
//! - Self-protection is a single guard shared by every self-targetable mutation

pub mod authorizer;
pub mod permission;
pub mod self_guard;

use std::fmt;

use thiserror::Error;

pub use authorizer::RoleAuthorizer;
pub use permission::PermissionTable;
pub use self_guard::{guard_self_target, SelfTargetAction};

use crate::auth::Role;
use crate::error::ErrorKind;

/// What a route or operation demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Minimum rank in the role hierarchy.
    Role(Role),
    /// A `verb:object` action from the permission table.
    Permission(String),
}

impl Requirement {
    pub fn permission(action: impl Into<String>) -> Self {
        Requirement::Permission(action.into())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Role(role) => write!(f, "role {role}"),
            Requirement::Permission(action) => write!(f, "permission {action}"),
        }
    }
}

/// Authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("account deactivated")]
    AccountDeactivated,

    #[error("admin role required")]
    AdminRequired,

    #[error("editor role required")]
    EditorRequired,

    #[error("insufficient permissions: requires {requirement}")]
    PermissionDenied { requirement: String },

    #[error("only the owner or an admin may do this")]
    OwnershipRequired,

    #[error("cannot {0} your own account")]
    InvalidSelfOperation(&'static str),
}

impl AuthzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthzError::AccountDeactivated => ErrorKind::AccountDeactivated,
            AuthzError::AdminRequired => ErrorKind::AdminRequired,
            AuthzError::EditorRequired => ErrorKind::EditorRequired,
            AuthzError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            AuthzError::OwnershipRequired => ErrorKind::OwnershipRequired,
            AuthzError::InvalidSelfOperation(_) => ErrorKind::InvalidSelfOperation,
        }
    }

    /// Internal detail that may be exposed when detailed errors are enabled.
    pub fn detail(&self) -> Option<String> {
        match self {
            AuthzError::PermissionDenied { requirement } => Some(format!("requires {requirement}")),
            _ => None,
        }
    }
}
