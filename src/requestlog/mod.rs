//! Per-request access logging.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → layer.rs (capture method, URL, peer, headers, received time)
//!     → inner handler runs
//!     → response body streams out, bytes counted
//!     → body finished or dropped: Entry handed to a RequestLogger
//!     → ncsa.rs (one NCSA combined line per exchange)
//! ```
//!
//! # Design Decisions
//! - Logging is a sink, not a signal: write failures never reach the request path
//! - Exactly one line per exchange, emitted when the body is done
//! - Loggers are shared across all request tasks and must serialize writes

pub mod layer;
pub mod ncsa;

use std::time::Duration;

use chrono::{DateTime, FixedOffset};

pub use layer::log_requests;
pub use ncsa::NcsaLogger;

/// One completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Peer IP address, empty when unknown.
    pub remote_ip: String,
    pub received_time: DateTime<FixedOffset>,
    pub request_method: String,
    /// Path and query as received.
    pub request_url: String,
    /// e.g. `HTTP/1.1`.
    pub proto: String,
    pub status: u16,
    pub response_body_size: u64,
    /// Raw header bytes; not necessarily UTF-8.
    pub referer: Vec<u8>,
    pub user_agent: Vec<u8>,
    pub latency: Duration,
}

/// Destination for request log entries.
///
/// Called concurrently from every in-flight request; must not fail.
pub trait RequestLogger: Send + Sync {
    fn log(&self, entry: &Entry);
}
