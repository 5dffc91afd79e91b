//! Response headers for rate-limited routes.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::ratelimit::Decision;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
pub const X_RATELIMIT_RESET_AT: HeaderName = HeaderName::from_static("x-ratelimit-reset-at");
pub const RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");

/// Write the `RateLimit-*` headers for `decision`; rejected decisions add `Retry-After`.
pub fn apply_rate_headers(headers: &mut HeaderMap, decision: &Decision) {
    let reset = decision.reset_after_secs();
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset));
    headers.insert(X_RATELIMIT_RESET_AT, HeaderValue::from(decision.reset_at));
    if !decision.allowed {
        headers.insert(RETRY_AFTER, HeaderValue::from(reset.max(1)));
    }
}
