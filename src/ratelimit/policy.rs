//! Named policies and the catalog built at startup.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Role;
use crate::config::{AdaptiveLimits, RateLimitConfig};

/// The built-in policy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyName {
    Default,
    Strict,
    Api,
    Public,
    Upload,
    ContactIntake,
    Search,
    Adaptive,
}

impl PolicyName {
    pub const ALL: [PolicyName; 8] = [
        PolicyName::Default,
        PolicyName::Strict,
        PolicyName::Api,
        PolicyName::Public,
        PolicyName::Upload,
        PolicyName::ContactIntake,
        PolicyName::Search,
        PolicyName::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Default => "default",
            PolicyName::Strict => "strict",
            PolicyName::Api => "api",
            PolicyName::Public => "public",
            PolicyName::Upload => "upload",
            PolicyName::ContactIntake => "contact_intake",
            PolicyName::Search => "search",
            PolicyName::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown rate limit policy '{s}'"))
    }
}

/// How the counter subject is derived from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Client address.
    ByAddress,
    /// `role:principal_id` when authenticated, `ip:address` otherwise.
    ByIdentity,
    /// A top-level string field of the JSON body, falling back to the address.
    ByField { field: String },
}

impl KeyStrategy {
    /// Whether the subject depends on a resolved principal.
    pub fn needs_identity(&self) -> bool {
        matches!(self, KeyStrategy::ByIdentity)
    }
}

/// Per-role limits for identity-keyed policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLimits {
    pub anonymous: u64,
    pub by_role: HashMap<Role, u64>,
}

impl RoleLimits {
    pub fn from_config(limits: &AdaptiveLimits) -> Self {
        let by_role = HashMap::from([
            (Role::Admin, limits.admin),
            (Role::Editor, limits.editor),
            (Role::Viewer, limits.viewer),
            (Role::Api, limits.api),
        ]);
        Self {
            anonymous: limits.anonymous,
            by_role,
        }
    }
}

/// One rate limit policy. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: PolicyName,
    pub window: Duration,
    pub max: u64,
    pub key: KeyStrategy,
    pub message: String,
    pub role_limits: Option<RoleLimits>,
}

impl Policy {
    fn builtin(name: PolicyName) -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        let (window, max, key, message) = match name {
            PolicyName::Default => (
                minutes(15),
                100,
                KeyStrategy::ByAddress,
                "Too many requests from this IP, please try again later.",
            ),
            PolicyName::Strict => (
                minutes(15),
                5,
                KeyStrategy::ByAddress,
                "Too many attempts, please try again later.",
            ),
            PolicyName::Api => (
                minutes(15),
                200,
                KeyStrategy::ByAddress,
                "API rate limit exceeded, please try again later.",
            ),
            PolicyName::Public => (
                minutes(15),
                500,
                KeyStrategy::ByAddress,
                "Too many requests, please try again later.",
            ),
            PolicyName::Upload => (
                minutes(60),
                50,
                KeyStrategy::ByAddress,
                "Upload limit exceeded, please try again later.",
            ),
            PolicyName::ContactIntake => (
                minutes(60),
                5,
                KeyStrategy::ByField {
                    field: "email".to_string(),
                },
                "Too many submissions, please try again later.",
            ),
            PolicyName::Search => (
                Duration::from_secs(60),
                30,
                KeyStrategy::ByAddress,
                "Too many search requests, please slow down.",
            ),
            PolicyName::Adaptive => (
                Duration::from_secs(60),
                60,
                KeyStrategy::ByIdentity,
                "Rate limit exceeded for your account, please slow down.",
            ),
        };

        Self {
            name,
            window,
            max,
            key,
            message: message.to_string(),
            role_limits: None,
        }
    }

    /// Effective limit for a caller of the given role (`None` when anonymous).
    pub fn limit_for(&self, role: Option<Role>) -> u64 {
        let Some(limits) = &self.role_limits else {
            return self.max;
        };
        match role {
            Some(role) => limits.by_role.get(&role).copied().unwrap_or(self.max),
            None => limits.anonymous,
        }
    }
}

/// The catalog of policies, shared read-only.
#[derive(Debug, Clone)]
pub struct PolicySet {
    policies: Arc<HashMap<PolicyName, Arc<Policy>>>,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

impl PolicySet {
    /// Built-in policies with config overrides applied.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let mut policies = HashMap::new();

        for name in PolicyName::ALL {
            let mut policy = Policy::builtin(name);

            if let Some(overrides) = config.policies.get(name.as_str()) {
                if let Some(window_secs) = overrides.window_secs {
                    policy.window = Duration::from_secs(window_secs);
                }
                if let Some(max) = overrides.max {
                    policy.max = max;
                }
                if let Some(message) = &overrides.message {
                    policy.message = message.clone();
                }
            }

            if name == PolicyName::Adaptive {
                let limits = RoleLimits::from_config(&config.adaptive);
                policy.max = limits.anonymous;
                policy.role_limits = Some(limits);
            }

            policies.insert(name, Arc::new(policy));
        }

        Self {
            policies: Arc::new(policies),
        }
    }

    pub fn get(&self, name: PolicyName) -> Arc<Policy> {
        // Every name is inserted in from_config.
        self.policies
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Arc::new(Policy::builtin(name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Policy>> {
        PolicyName::ALL.iter().filter_map(|name| self.policies.get(name))
    }
}
