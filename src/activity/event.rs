use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::PrincipalId;
use crate::error::ErrorKind;
use crate::ratelimit::Decision;

/// Result of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Denied(ErrorKind),
    RateLimited,
    /// Allowed without a counter because the shared store failed.
    Degraded,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Denied(_) => "denied",
            Outcome::RateLimited => "rate_limited",
            Outcome::Degraded => "degraded",
        }
    }
}

/// Who and which request an event belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub request_id: Option<String>,
    pub principal_id: Option<PrincipalId>,
}

/// One authentication, authorization or rate-limit evaluation.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub request_id: Option<String>,
    pub principal_id: Option<PrincipalId>,
    /// What was evaluated, e.g. `authenticate`, `authorize`, `rate_limit:strict`.
    pub action: String,
    pub outcome: Outcome,
    pub key: Option<String>,
    pub decision: Option<Decision>,
    /// Unix milliseconds.
    pub at: u64,
}

impl ActivityEvent {
    pub fn new(action: impl Into<String>, outcome: Outcome) -> Self {
        let at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            request_id: None,
            principal_id: None,
            action: action.into(),
            outcome,
            key: None,
            decision: None,
            at,
        }
    }

    pub fn with_origin(mut self, origin: &Origin) -> Self {
        self.request_id = origin.request_id.clone();
        self.principal_id = origin.principal_id.clone();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }
}
