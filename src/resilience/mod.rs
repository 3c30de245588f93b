//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Dependency probe attempt fails:
//!     → backoff.rs (next wait: 250ms, 500ms, 1s, ... capped at 30s)
//!     → probe sleeps, or exits early on cancellation
//! ```
//!
//! # Design Decisions
//! - Backoff is a plain value type; the caller owns the sleeping
//! - Waits double and saturate at the ceiling, they never wrap

pub mod backoff;

pub use backoff::Backoff;
