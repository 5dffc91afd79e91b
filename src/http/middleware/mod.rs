//! Router-wide middleware. Per-route gating lives in `http::guard`.

pub mod errors;
pub mod metrics;

pub use errors::render_errors;
pub use metrics::track_requests;
