//! Activity logging subsystem.
//!
//! # Data Flow
//! ```text
//! gate middleware / limiter
//!     → ActivityLogger::record (try_send, never blocks)
//!     → bounded mpsc channel (drop + count on overflow)
//!     → worker task
//!     → ActivitySink (TracingSink | MemorySink)
//! ```
//!
//! # Design Decisions
//! - Recording never adds latency to the request path
//! - Losing events under overload is acceptable; losing requests is not
//! - The worker drains buffered events on shutdown

pub mod event;
pub mod logger;
pub mod sink;

pub use event::{ActivityEvent, Origin, Outcome};
pub use logger::ActivityLogger;
pub use sink::{ActivitySink, MemorySink, TracingSink};
