pub mod http;
pub mod push;
pub mod udp;

pub use http::InfluxTransport;
pub use push::PushTransport;
pub use udp::send_udp_line;

use std::time::Duration;
use thiserror::Error;

/// Fixed receive timeout for every synchronous send-and-wait exchange.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Entries retried per opportunistic drain, bounding the latency a drain
/// adds to the caller whose own send just succeeded.
pub const DRAIN_BATCH: usize = 10;

/// Failures of a single delivery attempt. All of these are recoverable:
/// the record goes to the retry queue and the process carries on.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unable to resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error("connect to {host}:{port} failed after trying all addresses")]
    Connect { host: String, port: u16 },
    #[error("short write: only {written} of {expected} bytes accepted")]
    ShortWrite { written: usize, expected: usize },
    #[error("no response within {RECV_TIMEOUT:?}")]
    Timeout,
    #[error("malformed status line: {0}")]
    MalformedResponse(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a parsed HTTP status counts as a delivered write.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
