//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Dependency probes (probe.rs):
//!     Background task per dependency
//!     → ping.rs (TCP connect / HTTP GET)
//!     → retry with backoff until healthy or stopped
//!
//! Readiness (aggregator.rs):
//!     GET /healthz/readiness
//!     → every registered HealthChecker, in order
//!     → first failure short-circuits to 500 "unhealthy"
//!
//! Liveness (aggregator.rs):
//!     GET /healthz/liveness → always 200 "ok"
//! ```
//!
//! # Design Decisions
//! - `check_health` never blocks and never does I/O; probing happens elsewhere
//! - Probe states are terminal: Healthy and Stopped never change again
//! - Transient and terminal failures look the same on the wire but differ
//!   in the error value

pub mod aggregator;
pub mod ping;
pub mod probe;
pub mod warmup;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use aggregator::HealthHandler;
pub use ping::{HttpPing, Ping, PingError, TcpPing};
pub use probe::{AsyncProbe, ProbeStatus};
pub use warmup::WarmupCheck;

/// Reasons a health check can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    /// The dependency has not answered a ping yet; retried in the background.
    #[error("still pinging {dependency} ({elapsed:?} elapsed)")]
    StillProbing { dependency: String, elapsed: Duration },

    /// The probe was stopped before the dependency ever became healthy.
    #[error("ping of {dependency} stopped before becoming healthy")]
    ProbeStopped { dependency: String },

    /// The process is inside its configured startup delay.
    #[error("not ready yet, warming up for another {remaining:?}")]
    WarmingUp { remaining: Duration },

    #[error("{0}")]
    Unhealthy(String),
}

impl HealthError {
    /// Whether a later check may succeed without outside intervention.
    pub fn is_transient(&self) -> bool {
        !matches!(self, HealthError::ProbeStopped { .. })
    }
}

/// A single boolean health signal.
pub trait HealthChecker: Send + Sync {
    fn check_health(&self) -> Result<(), HealthError>;
}

impl<T: HealthChecker + ?Sized> HealthChecker for Arc<T> {
    fn check_health(&self) -> Result<(), HealthError> {
        (**self).check_health()
    }
}

impl<T: HealthChecker + ?Sized> HealthChecker for Box<T> {
    fn check_health(&self) -> Result<(), HealthError> {
        (**self).check_health()
    }
}

/// Adapter turning a closure into a [`HealthChecker`].
pub struct CheckerFn<F>(F);

impl<F> HealthChecker for CheckerFn<F>
where
    F: Fn() -> Result<(), HealthError> + Send + Sync,
{
    fn check_health(&self) -> Result<(), HealthError> {
        (self.0)()
    }
}

/// Wrap a closure as a health checker.
pub fn checker_fn<F>(f: F) -> CheckerFn<F>
where
    F: Fn() -> Result<(), HealthError> + Send + Sync,
{
    CheckerFn(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_checker() {
        let ok = checker_fn(|| Ok(()));
        assert!(ok.check_health().is_ok());

        let failing = checker_fn(|| Err(HealthError::Unhealthy("cache cold".into())));
        assert_eq!(
            failing.check_health().unwrap_err().to_string(),
            "cache cold"
        );
    }

    #[test]
    fn transient_classification() {
        let probing = HealthError::StillProbing {
            dependency: "db".into(),
            elapsed: Duration::from_secs(1),
        };
        let stopped = HealthError::ProbeStopped {
            dependency: "db".into(),
        };
        assert!(probing.is_transient());
        assert!(!stopped.is_transient());
        assert_eq!(
            stopped.to_string(),
            "ping of db stopped before becoming healthy"
        );
    }
}
