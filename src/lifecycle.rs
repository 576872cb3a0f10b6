// Lifecycle controller: the up/down state machine of one environment
use crate::engine::{ContainerEngine, ContainerHandle};
use crate::errors::{ComposeError, Result};
use crate::identity::EnvironmentKey;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Who brought the environment's containers up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This run called `up` and is responsible for `down`
    StartedByUs,
    /// The containers were already running and are left alone on release
    Adopted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Built,
    Up(Ownership),
    Down,
}

/// How `acquire` treats containers that already exist
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquirePolicy {
    /// Adopt running containers instead of refusing to start
    pub adopt_running: bool,
    /// The caller also built images (used only to warn when adopting)
    pub build_requested: bool,
}

/// Result of a successful `acquire`
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// Containers running at the moment of acquisition
    pub containers: Vec<ContainerHandle>,
    pub ownership: Ownership,
    /// True when another active scope already held the environment
    pub reused: bool,
}

/// What `release` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other scopes still hold the environment
    Retained { holders: usize },
    /// Last holder left an adopted environment running
    LeftRunning,
    /// Last holder brought the environment down
    Stopped,
    /// Nothing was acquired
    Idle,
}

struct LifecycleState {
    phase: Phase,
    built: bool,
    holders: usize,
}

/// One materialized environment, shared by every scope using its key
///
/// All transitions hold the state lock across the engine call, so at most
/// one `build`, `acquire` or `release` is in flight per environment.
pub struct Environment {
    key: EnvironmentKey,
    engine: Arc<dyn ContainerEngine>,
    state: Mutex<LifecycleState>,
}

impl Environment {
    pub fn new(key: EnvironmentKey, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            key,
            engine,
            state: Mutex::new(LifecycleState {
                phase: Phase::Absent,
                built: false,
                holders: 0,
            }),
        }
    }

    pub fn key(&self) -> &EnvironmentKey {
        &self.key
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_adopted(&self) -> bool {
        self.phase() == Phase::Up(Ownership::Adopted)
    }

    pub fn is_built(&self) -> bool {
        self.lock().built
    }

    /// Number of scopes currently holding the environment
    pub fn holders(&self) -> usize {
        self.lock().holders
    }

    /// Build the project's images unless `skip` is set
    ///
    /// Safe to call while containers exist; building never touches them.
    pub fn build(&self, skip: bool) -> Result<()> {
        let mut state = self.lock();
        if skip {
            debug!(key = %self.key, "skipping build");
            return Ok(());
        }

        info!(key = %self.key, project = self.engine.project_name(), "building images");
        self.engine.build()?;
        state.built = true;
        if state.phase == Phase::Absent {
            state.phase = Phase::Built;
        }
        Ok(())
    }

    /// Bring the environment up for one more scope
    pub fn acquire(&self, policy: AcquirePolicy) -> Result<Acquisition> {
        let mut state = self.lock();

        if let Phase::Up(ownership) = state.phase {
            // Nested or overlapping scope on the same key: share, never start twice
            let containers = self.engine.containers(None, true)?;
            state.holders += 1;
            debug!(key = %self.key, holders = state.holders, "reusing environment");
            return Ok(Acquisition {
                containers,
                ownership,
                reused: true,
            });
        }

        let existing = self.engine.containers(None, false)?;

        if existing.is_empty() {
            info!(key = %self.key, project = self.engine.project_name(), "starting containers");
            let started = self.engine.up()?;
            if started.is_empty() {
                return Err(ComposeError::NoContainersLaunched(self.key.to_string()));
            }
            state.phase = Phase::Up(Ownership::StartedByUs);
            state.holders = 1;
            return Ok(Acquisition {
                containers: started,
                ownership: Ownership::StartedByUs,
                reused: false,
            });
        }

        if !policy.adopt_running {
            let mut names: Vec<String> = existing.into_iter().map(|c| c.name).collect();
            names.sort();
            return Err(ComposeError::ContainersAlreadyExist(names));
        }

        if policy.build_requested {
            warn!(
                key = %self.key,
                "adopting running containers after a build; the freshly built images are not \
                 used by the adopted containers (skip the build to silence this)"
            );
        }
        self.warn_missing_services(&existing);

        info!(key = %self.key, containers = existing.len(), "adopting running containers");
        state.phase = Phase::Up(Ownership::Adopted);
        state.holders = 1;
        Ok(Acquisition {
            containers: existing,
            ownership: Ownership::Adopted,
            reused: false,
        })
    }

    /// Give up one scope's hold; the last holder stops what this run started
    pub fn release(&self, remove_volumes: bool) -> Result<Release> {
        let mut state = self.lock();

        let ownership = match state.phase {
            Phase::Up(ownership) => ownership,
            _ => return Ok(Release::Idle),
        };

        state.holders = state.holders.saturating_sub(1);
        if state.holders > 0 {
            debug!(key = %self.key, holders = state.holders, "environment still held");
            return Ok(Release::Retained {
                holders: state.holders,
            });
        }

        state.phase = Phase::Down;
        match ownership {
            Ownership::Adopted => {
                debug!(key = %self.key, "leaving adopted containers running");
                Ok(Release::LeftRunning)
            }
            Ownership::StartedByUs => {
                info!(key = %self.key, remove_volumes, "stopping containers");
                self.engine.down(remove_volumes)?;
                Ok(Release::Stopped)
            }
        }
    }

    /// Run-end teardown, regardless of how many scopes still hold the environment
    pub fn shutdown(&self, remove_volumes: bool) -> Result<Release> {
        let mut state = self.lock();
        if state.holders > 0 {
            warn!(key = %self.key, holders = state.holders, "shutting down a still-held environment");
        }
        state.holders = 0;

        let previous = state.phase;
        match previous {
            Phase::Up(Ownership::StartedByUs) => {
                state.phase = Phase::Down;
                self.engine.down(remove_volumes)?;
                Ok(Release::Stopped)
            }
            Phase::Up(Ownership::Adopted) => {
                state.phase = Phase::Down;
                Ok(Release::LeftRunning)
            }
            _ => Ok(Release::Idle),
        }
    }

    fn warn_missing_services(&self, running: &[ContainerHandle]) {
        let declared = match self.engine.services() {
            Ok(services) => services,
            Err(e) => {
                debug!(key = %self.key, error = %e, "could not list declared services");
                return;
            }
        };

        let running: BTreeSet<&str> = running.iter().map(|c| c.service.as_str()).collect();
        let missing: Vec<&str> = declared
            .iter()
            .map(String::as_str)
            .filter(|service| !running.contains(service))
            .collect();

        if !missing.is_empty() {
            warn!(
                key = %self.key,
                missing = %missing.join(", "),
                "adopted environment is missing running containers for some services"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Environment")
            .field("key", &self.key.as_str())
            .field("phase", &state.phase)
            .field("built", &state.built)
            .field("holders", &state.holders)
            .finish()
    }
}
