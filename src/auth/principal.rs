//! Principals and the principal store adapter.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::SeedPrincipal;
use crate::store::StoreError;

/// Stable identifier of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Role of a principal.
///
/// `Admin > Editor > Viewer` are ranked. `Api` is a separate lane for
/// service-to-service callers and has no rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
    Api,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Editor, Role::Viewer, Role::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
            Role::Api => "api",
        }
    }

    /// Position in the hierarchy; `None` for the unranked `Api` lane.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Role::Admin => Some(3),
            Role::Editor => Some(2),
            Role::Viewer => Some(1),
            Role::Api => None,
        }
    }

    /// Whether this role ranks at or above `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        match (self.rank(), required.rank()) {
            (Some(have), Some(need)) => have >= need,
            _ => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// An identity with a role and an active flag, as held by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

impl Principal {
    pub fn new(id: impl Into<PrincipalId>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
            is_active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Adapter over the durable user store.
///
/// The gate itself only needs `find_by_id`; the mutations back the bundled
/// admin endpoints.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError>;

    async fn update_role(&self, id: &PrincipalId, role: Role) -> Result<Option<Principal>, StoreError>;

    async fn set_active(&self, id: &PrincipalId, active: bool) -> Result<Option<Principal>, StoreError>;

    async fn delete(&self, id: &PrincipalId) -> Result<bool, StoreError>;
}

/// Principal store held in memory, seeded from config or tests.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    principals: DashMap<PrincipalId, Principal>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: &[SeedPrincipal]) -> Self {
        let store = Self::new();
        for entry in seed {
            store.insert(Principal {
                id: PrincipalId::new(entry.id.clone()),
                email: entry.email.clone(),
                role: entry.role,
                is_active: entry.active,
            });
        }
        store
    }

    pub fn insert(&self, principal: Principal) {
        self.principals.insert(principal.id.clone(), principal);
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.get(id).map(|p| p.value().clone()))
    }

    async fn update_role(&self, id: &PrincipalId, role: Role) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.get_mut(id).map(|mut p| {
            p.role = role;
            p.clone()
        }))
    }

    async fn set_active(&self, id: &PrincipalId, active: bool) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.get_mut(id).map(|mut p| {
            p.is_active = active;
            p.clone()
        }))
    }

    async fn delete(&self, id: &PrincipalId) -> Result<bool, StoreError> {
        Ok(self.principals.remove(id).is_some())
    }
}
