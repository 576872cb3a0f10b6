// Run-level harness: scope-keyed session slots and end-of-run shutdown
//
// Test harnesses own scope lifetimes; this type only gives them a place to
// keep one session per (scope, id) and a single point to tear everything down.
// Construct it once per run and pass it by reference (or keep it in the test
// binary's own static); the crate never reaches for a global.

use crate::config::Options;
use crate::engine::compose::ComposeCliFactory;
use crate::engine::EngineFactory;
use crate::errors::Result;
use crate::lifecycle::Release;
use crate::registry::EnvironmentRegistry;
use crate::scope::{Scope, ScopeBinder, ScopeSession};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

type SlotKey = (Scope, String);
type Slot = Arc<Mutex<Option<Arc<ScopeSession>>>>;

pub struct Harness {
    binder: ScopeBinder,
    // Setup runs under the slot's own lock, so one (scope, id) is never set
    // up twice while other slots stay free
    sessions: Mutex<HashMap<SlotKey, Slot>>,
}

impl Harness {
    /// Harness using the docker compose CLI and options loaded from `cwd`
    pub fn from_dir(cwd: &Path) -> Result<Self> {
        let options = Options::load(cwd)?;
        Self::new(options, Arc::new(ComposeCliFactory::new()), cwd.to_path_buf())
    }

    pub fn new(options: Options, factory: Arc<dyn EngineFactory>, cwd: PathBuf) -> Result<Self> {
        let registry = Arc::new(EnvironmentRegistry::new());
        let binder = ScopeBinder::new(registry, factory, options, cwd)?;
        Ok(Self::with_binder(binder))
    }

    pub fn with_binder(binder: ScopeBinder) -> Self {
        Self {
            binder,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn binder(&self) -> &ScopeBinder {
        &self.binder
    }

    /// Session for `(scope, id)`, set up on first use
    pub fn enter(&self, scope: Scope, id: &str) -> Result<Arc<ScopeSession>> {
        let slot = {
            let mut sessions = self.lock();
            Arc::clone(sessions.entry((scope, id.to_string())).or_default())
        };

        let mut entry = lock(&slot);
        if let Some(existing) = entry.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let session = Arc::new(self.binder.for_scope(scope).setup()?);
        *entry = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Tear down the session for `(scope, id)`, if one is active
    pub fn exit(&self, scope: Scope, id: &str) -> Result<Release> {
        let slot = self.lock().remove(&(scope, id.to_string()));
        let session = slot.and_then(|slot| {
            let mut entry = lock(&slot);
            entry.take()
        });
        match session {
            Some(session) => session.teardown(),
            None => Ok(Release::Idle),
        }
    }

    /// Number of active sessions
    pub fn active(&self) -> usize {
        let slots: Vec<Slot> = self.lock().values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    /// Tear down every session, narrowest scope first, then stop leftover environments
    ///
    /// Every session and environment is attempted; the first error is returned.
    pub fn shutdown(&self) -> Result<()> {
        let mut remaining: Vec<(SlotKey, Arc<ScopeSession>)> = self
            .lock()
            .drain()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|(key, slot)| {
                let mut entry = lock(&slot);
                entry.take().map(|session| (key, session))
            })
            .collect();
        remaining.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut first_error = None;
        for ((scope, id), session) in remaining {
            if let Err(e) = session.teardown() {
                warn!(%scope, id = %id, error = %e, "session teardown failed during shutdown");
                first_error.get_or_insert(e);
            }
        }

        let remove_volumes = self.binder.options().remove_volumes;
        for environment in self.binder.registry().drain() {
            match environment.shutdown(remove_volumes) {
                Ok(Release::Stopped) => {
                    info!(key = %environment.key(), "stopped environment at end of run")
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(key = %environment.key(), error = %e, "environment shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SlotKey, Slot>> {
        lock(&self.sessions)
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
