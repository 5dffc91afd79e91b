//! Guard against principals locking themselves out.

use super::AuthzError;
use crate::auth::{Principal, PrincipalId, Role};

/// A mutation that may target the acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTargetAction {
    ChangeRole(Role),
    Deactivate,
    Delete,
}

/// Reject mutations an actor may not apply to itself.
///
/// Acting on a different principal always passes, including other admins.
pub fn guard_self_target(
    actor: &Principal,
    target: &PrincipalId,
    action: SelfTargetAction,
) -> Result<(), AuthzError> {
    if actor.id != *target {
        return Ok(());
    }
    match action {
        SelfTargetAction::ChangeRole(new_role) if actor.role == Role::Admin && new_role != Role::Admin => {
            Err(AuthzError::InvalidSelfOperation("change the role of"))
        }
        SelfTargetAction::ChangeRole(_) => Ok(()),
        SelfTargetAction::Deactivate => Err(AuthzError::InvalidSelfOperation("deactivate")),
        SelfTargetAction::Delete => Err(AuthzError::InvalidSelfOperation("delete")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_cannot_demote_deactivate_or_delete_itself() {
        let admin = Principal::new("1", "root@example.com", Role::Admin);
        for action in [
            SelfTargetAction::ChangeRole(Role::Editor),
            SelfTargetAction::Deactivate,
            SelfTargetAction::Delete,
        ] {
            assert!(matches!(
                guard_self_target(&admin, &admin.id, action),
                Err(AuthzError::InvalidSelfOperation(_))
            ));
        }
        assert!(guard_self_target(&admin, &admin.id, SelfTargetAction::ChangeRole(Role::Admin)).is_ok());
    }

    #[test]
    fn other_admins_are_fair_game() {
        let admin = Principal::new("1", "root@example.com", Role::Admin);
        let other = PrincipalId::from("2");
        assert!(guard_self_target(&admin, &other, SelfTargetAction::ChangeRole(Role::Viewer)).is_ok());
        assert!(guard_self_target(&admin, &other, SelfTargetAction::Delete).is_ok());
    }
}
