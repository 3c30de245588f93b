//! Self-healing dependency probe.
//!
//! # State Machine
//! ```text
//! Probing ──ping ok──────────▶ Healthy  (terminal)
//!    │
//!    └──stop / drop──────────▶ Stopped  (terminal)
//! ```
//!
//! # Design Decisions
//! - One background task per probe; it is the only writer of the status
//! - Failed pings back off 250ms → 30s; the wait is cut short by cancellation
//! - `check_health` only reads the status channel, it never awaits
//! - `stop` waits for the task's completion signal before returning

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::health::{HealthChecker, HealthError, Ping};
use crate::observability::metrics;
use crate::resilience::Backoff;

/// Observable state of an [`AsyncProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Still retrying the dependency.
    Probing,
    /// The dependency answered once; the probe task has exited.
    Healthy,
    /// The probe was cancelled before the dependency answered.
    Stopped,
}

impl ProbeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProbeStatus::Probing)
    }
}

/// Health checker that pings a dependency in the background until it
/// answers, then reports healthy for the rest of its life.
pub struct AsyncProbe {
    name: Arc<str>,
    started: Instant,
    cancel: watch::Sender<bool>,
    status: watch::Receiver<ProbeStatus>,
}

impl AsyncProbe {
    /// Start probing `ping` on the current Tokio runtime.
    pub fn spawn<P: Ping>(name: impl Into<String>, ping: P, backoff: Backoff) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(ProbeStatus::Probing);

        tracing::debug!(
            dependency = %name,
            initial_wait = ?backoff.initial(),
            max_wait = ?backoff.max(),
            "Starting dependency probe"
        );
        metrics::record_probe_health(&name, false);

        tokio::spawn(run_probe(name.clone(), ping, backoff, cancel_rx, status_tx));

        Self {
            name,
            started: Instant::now(),
            cancel: cancel_tx,
            status: status_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, without waiting.
    pub fn status(&self) -> ProbeStatus {
        *self.status.borrow()
    }

    /// Wait until the probe reaches a terminal state.
    pub async fn wait(&self) -> ProbeStatus {
        let mut rx = self.status.clone();
        let status = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(s) => *s,
            // The task is gone without reporting; it can no longer become healthy.
            Err(_) => ProbeStatus::Stopped,
        };
        status
    }

    /// Cancel the probe and wait for its task to finish.
    ///
    /// Safe to call repeatedly and from several tasks at once. A probe that
    /// already became healthy stays healthy.
    pub async fn stop(&self) -> ProbeStatus {
        self.cancel.send_replace(true);
        let status = self.wait().await;
        tracing::debug!(dependency = %self.name, status = ?status, "Dependency probe stopped");
        status
    }
}

impl HealthChecker for AsyncProbe {
    fn check_health(&self) -> Result<(), HealthError> {
        match self.status() {
            ProbeStatus::Healthy => Ok(()),
            ProbeStatus::Stopped => Err(HealthError::ProbeStopped {
                dependency: self.name.to_string(),
            }),
            ProbeStatus::Probing => Err(HealthError::StillProbing {
                dependency: self.name.to_string(),
                elapsed: self.started.elapsed(),
            }),
        }
    }
}

impl Drop for AsyncProbe {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

impl std::fmt::Debug for AsyncProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncProbe")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Publishes the probe outcome when the task ends, including by panic.
struct Completion {
    name: Arc<str>,
    status: watch::Sender<ProbeStatus>,
    outcome: ProbeStatus,
}

impl Drop for Completion {
    fn drop(&mut self) {
        metrics::record_probe_health(&self.name, self.outcome == ProbeStatus::Healthy);
        self.status.send_replace(self.outcome);
    }
}

async fn run_probe<P: Ping>(
    name: Arc<str>,
    ping: P,
    mut backoff: Backoff,
    mut cancel: watch::Receiver<bool>,
    status: watch::Sender<ProbeStatus>,
) {
    let mut completion = Completion {
        name: name.clone(),
        status,
        outcome: ProbeStatus::Stopped,
    };
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let result = tokio::select! {
            result = ping.ping() => result,
            _ = cancelled(&mut cancel) => return,
        };

        match result {
            Ok(()) => {
                tracing::info!(dependency = %name, attempt, "Dependency is healthy");
                completion.outcome = ProbeStatus::Healthy;
                return;
            }
            Err(e) => {
                let wait = backoff.next_wait();
                tracing::debug!(
                    dependency = %name,
                    attempt,
                    error = %e,
                    retry_in = ?wait,
                    "Dependency ping failed"
                );
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancelled(&mut cancel) => return,
                }
            }
        }
    }
}

/// Resolves once cancellation is requested or the probe handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::PingError;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails until the given attempt number, then succeeds.
    struct FlakyPing {
        attempts: Arc<AtomicU32>,
        succeed_on: u32,
    }

    impl Ping for FlakyPing {
        fn ping(&self) -> BoxFuture<'_, Result<(), PingError>> {
            Box::pin(async move {
                let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= self.succeed_on {
                    Ok(())
                } else {
                    Err(PingError::Timeout(Duration::from_millis(1)))
                }
            })
        }
    }

    fn flaky(succeed_on: u32) -> (FlakyPing, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        (
            FlakyPing {
                attempts: attempts.clone(),
                succeed_on,
            },
            attempts,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_healthy_on_third_attempt() {
        let (ping, attempts) = flaky(3);
        let probe = AsyncProbe::spawn("db", ping, Backoff::default());

        // Let the first attempt run; the task is now parked on its 250ms wait.
        tokio::task::yield_now().await;
        assert!(matches!(
            probe.check_health(),
            Err(HealthError::StillProbing { .. })
        ));
        assert_eq!(probe.status(), ProbeStatus::Probing);

        assert_eq!(probe.wait().await, ProbeStatus::Healthy);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(probe.check_health().is_ok());

        // The loop has exited: no further pings happen.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(probe.check_health().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_spacing_between_attempts() {
        let (ping, attempts) = flaky(u32::MAX);
        let probe = AsyncProbe::spawn("db", ping, Backoff::default());

        tokio::task::yield_now().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(260)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        // Second wait is 500ms, so nothing new at +400ms.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        probe.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_healthy_is_terminal() {
        let (ping, attempts) = flaky(u32::MAX);
        let probe = AsyncProbe::spawn("db", ping, Backoff::default());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(
            probe.check_health(),
            Err(HealthError::StillProbing { .. })
        ));

        assert_eq!(probe.stop().await, ProbeStatus::Stopped);
        // stop() only returns after the completion signal fired.
        assert_eq!(probe.status(), ProbeStatus::Stopped);
        match probe.check_health() {
            Err(HealthError::ProbeStopped { dependency }) => assert_eq!(dependency, "db"),
            other => panic!("expected terminal failure, got {other:?}"),
        }

        let seen = attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_concurrent() {
        let (ping, _) = flaky(u32::MAX);
        let probe = AsyncProbe::spawn("cache", ping, Backoff::default());

        let (a, b) = tokio::join!(probe.stop(), probe.stop());
        assert_eq!(a, ProbeStatus::Stopped);
        assert_eq!(b, ProbeStatus::Stopped);
        assert_eq!(probe.stop().await, ProbeStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_healthy_keeps_healthy() {
        let (ping, _) = flaky(1);
        let probe = AsyncProbe::spawn("db", ping, Backoff::default());

        assert_eq!(probe.wait().await, ProbeStatus::Healthy);
        assert_eq!(probe.stop().await, ProbeStatus::Healthy);
        assert!(probe.check_health().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_hung_ping() {
        struct HangingPing;
        impl Ping for HangingPing {
            fn ping(&self) -> BoxFuture<'_, Result<(), PingError>> {
                Box::pin(futures_util::future::pending())
            }
        }

        let probe = AsyncProbe::spawn("slow", HangingPing, Backoff::default());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.stop().await, ProbeStatus::Stopped);
    }
}
