//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Server::listen_and_serve(addr)
//!     → server.rs (one-time wiring of the composed router)
//!         /healthz/liveness   → always ok
//!         /healthz/readiness  → HealthHandler
//!         everything else     → TraceLayer → trace export → request log → app
//!     → driver.rs (bind, serve, graceful shutdown)
//! ```

pub mod driver;
pub mod server;

pub use driver::{DefaultDriver, Driver, DriverError, DriverFuture, TlsDriver};
pub use server::{Options, Server, ServerError, HEALTH_PREFIX};
