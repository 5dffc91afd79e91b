//! Rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! request
//!     → subject.rs (address | role:id | body field)
//!     → policy.rs (window, max, per-role limit)
//!     → limiter.rs (atomic INCR + expiry in the shared store)
//!     → Decision (allowed / rejected / degraded)
//!     → response headers + activity event
//! ```
//!
//! # Design Decisions
//! - Fixed windows: counters are created on first hit and expire at window end
//! - One generic limiter evaluates any `Policy` value
//! - Store failures fail open; an outage must not take the CMS down

pub mod limiter;
pub mod policy;
pub mod subject;

use std::time::Duration;

use thiserror::Error;

pub use limiter::RateLimiter;
pub use policy::{KeyStrategy, Policy, PolicyName, PolicySet, RoleLimits};
pub use subject::{subject_for, SubjectSource};

use crate::auth::token::unix_now;

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Window end, unix seconds.
    pub reset_at: u64,
    pub reset_after: Duration,
    /// Set when the store failed and the request was let through uncounted.
    pub degraded: bool,
}

impl Decision {
    pub(crate) fn counted(count: u64, limit: u64, ttl: Duration) -> Self {
        Self {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at: unix_now() + ceil_secs(ttl),
            reset_after: ttl,
            degraded: false,
        }
    }

    pub(crate) fn uncounted(limit: u64, window: Duration, degraded: bool) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_at: unix_now() + ceil_secs(window),
            reset_after: window,
            degraded,
        }
    }

    /// Seconds until the window resets, rounded up.
    pub fn reset_after_secs(&self) -> u64 {
        ceil_secs(self.reset_after)
    }

    /// The more restrictive of two decisions: fewer remaining, then later reset.
    pub fn tighter(self, other: Decision) -> Decision {
        match self.remaining.cmp(&other.remaining) {
            std::cmp::Ordering::Less => self,
            std::cmp::Ordering::Greater => other,
            std::cmp::Ordering::Equal if other.reset_after > self.reset_after => other,
            std::cmp::Ordering::Equal => self,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    (duration.as_millis() as u64).div_ceil(1000)
}

/// Rate limit failures.
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    #[error("{message}")]
    Exceeded {
        policy: PolicyName,
        message: String,
        decision: Decision,
    },
}
