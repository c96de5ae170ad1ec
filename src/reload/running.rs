//! Map of running modules keyed by config hash.

use std::collections::HashMap;
use std::sync::Arc;

use metricwatch_sdk::{ModuleHash, ModuleRunner};
use parking_lot::Mutex;

/// Thread-safe registry of the modules a reloader started.
///
/// Never hand out the lock: callers that need to start or stop runners
/// work on a [`copy_list`](Self::copy_list) snapshot.
#[derive(Debug, Default)]
pub struct RunningRegistry {
    runners: Mutex<HashMap<ModuleHash, Arc<ModuleRunner>>>,
}

impl RunningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hash: ModuleHash, runner: Arc<ModuleRunner>) {
        self.runners.lock().insert(hash, runner);
    }

    pub fn remove(&self, hash: &ModuleHash) -> Option<Arc<ModuleRunner>> {
        self.runners.lock().remove(hash)
    }

    pub fn has(&self, hash: &ModuleHash) -> bool {
        self.runners.lock().contains_key(hash)
    }

    pub fn get(&self, hash: &ModuleHash) -> Option<Arc<ModuleRunner>> {
        self.runners.lock().get(hash).cloned()
    }

    /// Point-in-time copy of the map.
    pub fn copy_list(&self) -> HashMap<ModuleHash, Arc<ModuleRunner>> {
        self.runners.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.runners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.lock().is_empty()
    }
}
