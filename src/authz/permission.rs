//! Per-role permission allow-lists.

use std::collections::{HashMap, HashSet};

use crate::auth::Role;
use crate::config::AuthzConfig;

const EDITOR_DEFAULTS: &[&str] = &[
    "read:products",
    "write:products",
    "read:projects",
    "write:projects",
    "read:news",
    "write:news",
    "read:media",
    "write:media",
    "read:contacts",
    "read:quotes",
];

const VIEWER_DEFAULTS: &[&str] = &[
    "read:products",
    "read:projects",
    "read:news",
    "read:contacts",
    "read:quotes",
];

const API_DEFAULTS: &[&str] = &[
    "read:products",
    "read:projects",
    "read:news",
    "write:contacts",
    "write:quotes",
];

/// Allow-list of `verb:object` actions for each non-admin role.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    allowed: HashMap<Role, HashSet<String>>,
}

impl Default for PermissionTable {
    fn default() -> Self {
        let mut allowed = HashMap::new();
        for (role, actions) in [
            (Role::Editor, EDITOR_DEFAULTS),
            (Role::Viewer, VIEWER_DEFAULTS),
            (Role::Api, API_DEFAULTS),
        ] {
            allowed.insert(role, actions.iter().map(|a| a.to_string()).collect());
        }
        Self { allowed }
    }
}

impl PermissionTable {
    /// Defaults with each configured role's list replacing its default.
    ///
    /// Unknown role names are rejected earlier by config validation and are
    /// skipped here.
    pub fn from_config(config: &AuthzConfig) -> Self {
        let mut table = Self::default();
        for (name, actions) in &config.permissions {
            let Ok(role) = name.parse::<Role>() else {
                continue;
            };
            if role == Role::Admin {
                continue;
            }
            table.allowed.insert(role, actions.iter().cloned().collect());
        }
        table
    }

    pub fn allows(&self, role: Role, action: &str) -> bool {
        self.allowed
            .get(&role)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Actions granted to `role`, sorted.
    pub fn actions(&self, role: Role) -> Vec<&str> {
        let mut actions: Vec<&str> = self
            .allowed
            .get(&role)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default();
        actions.sort_unstable();
        actions
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_table() {
        let table = PermissionTable::default();
        assert!(table.allows(Role::Editor, "write:media"));
        assert!(!table.allows(Role::Editor, "write:contacts"));
        assert!(table.allows(Role::Viewer, "read:quotes"));
        assert!(!table.allows(Role::Viewer, "write:products"));
        assert!(table.allows(Role::Api, "write:contacts"));
        assert!(!table.allows(Role::Api, "read:contacts"));
        assert!(table.actions(Role::Admin).is_empty());
    }

    #[test]
    fn config_replaces_role_list() {
        let mut permissions = BTreeMap::new();
        permissions.insert("viewer".to_string(), vec!["read:media".to_string()]);
        let table = PermissionTable::from_config(&AuthzConfig { permissions });

        assert_eq!(table.actions(Role::Viewer), vec!["read:media"]);
        assert!(table.allows(Role::Editor, "write:news"));
    }
}
