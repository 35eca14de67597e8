#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Safe within realistic value bounds (statuses, sizes)
    clippy::missing_errors_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. QueueError in queue module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

//! Resilient telemetry delivery for field-meter daemons.
//!
//! Measurements are encoded into InfluxDB line protocol, delivered over
//! HTTP (InfluxDB v1/v2 write API) or a WebSocket/HTTP dashboard push
//! channel, and buffered in a bounded FIFO retry queue when delivery
//! fails. One [`Client`] serves one destination.

pub mod client;
pub mod config;
pub mod encode;
pub mod queue;
pub mod sender;

// Re-export main types for easy access
pub use client::{Client, ClientError};
pub use config::{ClientConfig, Credentials, Destination, InfluxConfig, PushConfig};
pub use encode::{EncodeError, FieldValue, LineBuilder, RecordOp, SizeHint};
pub use queue::{QueueError, RetryQueue};
pub use sender::TransportError;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
