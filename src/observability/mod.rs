//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (sampled request spans with trace ids)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//!     → Registered TraceExporters
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Metrics are cheap and no-ops until a recorder is installed
//! - Span export is sampled to keep per-request overhead low

pub mod logging;
pub mod metrics;
pub mod tracing;
