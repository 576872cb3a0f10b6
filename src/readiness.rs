// Readiness polling: wait until a service's container is actually running
use crate::clock::{Clock, SystemClock};
use crate::engine::{ContainerEngine, ContainerHandle};
use crate::errors::{ComposeError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Interval between container state polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `get` waits for a service by default
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Polls the engine until a service's container is running
///
/// `up` returns before containers have finished starting, so callers that
/// need a live service go through this waiter. It is the only retrying
/// operation in the crate.
#[derive(Clone)]
pub struct ReadinessWaiter {
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReadinessWaiter {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, Arc::new(SystemClock))
    }

    pub fn with_clock(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { clock, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `service` has a running (not restarting) container
    ///
    /// Fails with `ContainerDoesNotExist` as soon as a poll finds no
    /// container at all, and with `ContainerNotRunning` once `timeout` has
    /// elapsed. A sleep never extends past the remaining budget.
    pub fn wait_running(
        &self,
        engine: &dyn ContainerEngine,
        service: &str,
        timeout: Duration,
    ) -> Result<ContainerHandle> {
        let start = self.clock.now();
        let mut polls = 0usize;

        loop {
            polls += 1;
            let containers = engine.containers(Some(service), true)?;

            let container = match pick(containers) {
                Some(container) => container,
                None => return Err(ComposeError::ContainerDoesNotExist(service.to_string())),
            };

            if container.is_running() {
                debug!(service, container = %container.name, polls, "container is running");
                return Ok(container);
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= timeout {
                let state = container.human_readable_state();
                warn!(service, state = %state, ?timeout, "container did not reach running state");
                return Err(ComposeError::ContainerNotRunning {
                    service: service.to_string(),
                    state,
                    timeout,
                });
            }

            self.clock.sleep(self.interval.min(timeout - elapsed));
        }
    }
}

impl Default for ReadinessWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Prefer a running container when a service is scaled to several
fn pick(containers: Vec<ContainerHandle>) -> Option<ContainerHandle> {
    let mut first = None;
    for container in containers {
        if container.is_running() {
            return Some(container);
        }
        if first.is_none() {
            first = Some(container);
        }
    }
    first
}
