/// Run-scoped environment registry
///
/// Maps each [`EnvironmentKey`] to at most one live value for the lifetime of
/// a run. Construction is single-flight per key: concurrent callers asking
/// for the same unseen key block until the first caller's factory finishes
/// and then share its result. A failed factory leaves the key uncached, so
/// the next caller retries with its own factory.
///
/// The map lock is only held long enough to find or insert a key's slot.
/// Slow construction of one environment never blocks lookups of another.
use crate::errors::Result;
use crate::identity::EnvironmentKey;
use crate::lifecycle::Environment;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

pub struct EnvironmentRegistry<T = Environment> {
    slots: Mutex<HashMap<EnvironmentKey, Slot<T>>>,
}

impl<T> EnvironmentRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or build it once with `factory`
    pub fn get_or_create<F>(&self, key: &EnvironmentKey, factory: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        // Per-key lock: waiters for this key queue here while the factory runs
        let mut entry = lock(&slot);
        if let Some(existing) = entry.as_ref() {
            debug!(key = %key, "registry hit");
            return Ok(Arc::clone(existing));
        }

        debug!(key = %key, "registry miss, creating environment");
        let created = Arc::new(factory()?);
        *entry = Some(Arc::clone(&created));
        Ok(created)
    }

    /// Cached value for `key`, without creating one
    pub fn get(&self, key: &EnvironmentKey) -> Option<Arc<T>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let entry = lock(&slot);
        entry.clone()
    }

    /// Number of keys with a successfully created value
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with a successfully created value
    pub fn keys(&self) -> Vec<EnvironmentKey> {
        let slots: Vec<(EnvironmentKey, Slot<T>)> = lock(&self.slots)
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        slots
            .into_iter()
            .filter(|(_, slot)| lock(slot).is_some())
            .map(|(key, _)| key)
            .collect()
    }

    /// Remove and return every cached value, for end-of-run shutdown
    pub fn drain(&self) -> Vec<Arc<T>> {
        let slots: Vec<Slot<T>> = lock(&self.slots).drain().map(|(_, slot)| slot).collect();
        slots
            .into_iter()
            .filter_map(|slot| {
                let mut entry = lock(&slot);
                entry.take()
            })
            .collect()
    }
}

impl<T> Default for EnvironmentRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A panicking test must not wedge every other test sharing the registry
fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
