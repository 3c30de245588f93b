//! HTTP service shell: health checks, request logging, tracing and a
//! pluggable network driver around an application router.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod requestlog;
pub mod resilience;

pub use config::ServiceConfig;
pub use http::{Options, Server};
