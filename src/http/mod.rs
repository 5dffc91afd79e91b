//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, router-wide layers)
//!     → request.rs (request ID, client address)
//!     → guard.rs (rate limits → authenticate → authorize → identity limits)
//!     → handlers.rs / admin
//!     → response.rs (RateLimit-* headers)
//!     → middleware/errors.rs (error envelope with request ID)
//!     → Send to client
//! ```

pub mod extract;
pub mod guard;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod state;
pub mod tls;

pub use extract::{CurrentPrincipal, RequestOrigin};
pub use guard::{Guard, GuardBuilder, X_API_KEY};
pub use request::{client_ip, request_id, UuidRequestId, X_REQUEST_ID};
pub use server::GateServer;
pub use state::{GateSettings, GateState};
