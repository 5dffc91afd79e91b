use std::sync::Arc;

use super::{AuthzError, PermissionTable, Requirement};
use crate::auth::{Principal, PrincipalId, Role};
use crate::observability::metrics;

/// Checks a live principal against a requirement.
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    table: Arc<PermissionTable>,
}

impl RoleAuthorizer {
    pub fn new(table: PermissionTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &PermissionTable {
        &self.table
    }

    pub fn authorize(&self, principal: &Principal, requirement: &Requirement) -> Result<(), AuthzError> {
        let result = self.evaluate(principal, requirement);
        if let Err(e) = &result {
            metrics::record_authz_denial(e.kind().as_str());
        }
        result
    }

    fn evaluate(&self, principal: &Principal, requirement: &Requirement) -> Result<(), AuthzError> {
        if !principal.is_active {
            return Err(AuthzError::AccountDeactivated);
        }
        if principal.role == Role::Admin {
            return Ok(());
        }

        match requirement {
            Requirement::Role(required) if principal.role.satisfies(*required) => Ok(()),
            Requirement::Role(Role::Admin) => Err(AuthzError::AdminRequired),
            Requirement::Role(Role::Editor) => Err(AuthzError::EditorRequired),
            Requirement::Permission(action) if self.table.allows(principal.role, action) => Ok(()),
            other => Err(AuthzError::PermissionDenied {
                requirement: other.to_string(),
            }),
        }
    }

    /// Admin or the owner of the resource.
    pub fn authorize_owner(&self, principal: &Principal, owner: &PrincipalId) -> Result<(), AuthzError> {
        let result = if !principal.is_active {
            Err(AuthzError::AccountDeactivated)
        } else if principal.role == Role::Admin || principal.id == *owner {
            Ok(())
        } else {
            Err(AuthzError::OwnershipRequired)
        };
        if let Err(e) = &result {
            metrics::record_authz_denial(e.kind().as_str());
        }
        result
    }
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self::new(PermissionTable::default())
    }
}
