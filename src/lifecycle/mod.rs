//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!
//! Shutdown order (main.rs):
//!     Server::shutdown(grace) → drain listeners → stop probes → exit
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: connections still open after it are closed
//! - Probes stop after the listeners, so readiness never flips mid-drain

pub mod signals;

pub use signals::shutdown_signal;
