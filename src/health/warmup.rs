//! Startup delay before reporting ready.

use std::time::Duration;

use tokio::time::Instant;

use crate::health::{HealthChecker, HealthError};

/// Reports not-ready for a fixed period after construction, healthy after.
#[derive(Debug, Clone)]
pub struct WarmupCheck {
    ready_at: Instant,
}

impl WarmupCheck {
    pub fn new(delay: Duration) -> Self {
        Self {
            ready_at: Instant::now() + delay,
        }
    }
}

impl HealthChecker for WarmupCheck {
    fn check_health(&self) -> Result<(), HealthError> {
        let now = Instant::now();
        if now >= self.ready_at {
            Ok(())
        } else {
            Err(HealthError::WarmingUp {
                remaining: self.ready_at - now,
            })
        }
    }
}
