//! In-memory gain backend
//!
//! Models a mixer without touching hardware. Used for offline runs
//! (`backend.kind: memory`) and as the test double for the core: it keeps a
//! log of every successful write and can be told to fail specific controls.

use super::{BackendError, GainBackend, MAX_LEVEL};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Hardware model backed by a map of control levels
pub struct MemoryBackend {
    /// Controls in inventory order
    order: Vec<String>,
    /// Current level per control
    levels: RwLock<HashMap<String, u8>>,
    /// Controls whose reads and writes fail
    failing: RwLock<HashSet<String>>,
    /// Successful writes, oldest first
    writes: Mutex<Vec<(String, u8)>>,
}

impl MemoryBackend {
    /// Create a backend seeded with (control, level) pairs
    pub fn with_levels<S: AsRef<str>>(controls: &[(S, u8)]) -> Self {
        let mut order = Vec::with_capacity(controls.len());
        let mut levels = HashMap::with_capacity(controls.len());
        for (name, level) in controls {
            let name = name.as_ref().to_string();
            if levels.insert(name.clone(), (*level).min(MAX_LEVEL)).is_none() {
                order.push(name);
            }
        }

        Self {
            order,
            levels: RwLock::new(levels),
            failing: RwLock::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Make every call on `control` fail (or succeed again)
    pub fn set_failing(&self, control: &str, failing: bool) {
        let mut set = self.failing.write();
        if failing {
            set.insert(control.to_string());
        } else {
            set.remove(control);
        }
    }

    /// Change a level behind the core's back (a second controller, a knob)
    pub fn external_change(&self, control: &str, value: u8) {
        if let Some(level) = self.levels.write().get_mut(control) {
            *level = value.min(MAX_LEVEL);
        }
    }

    /// Current level without going through the failure check
    pub fn peek(&self, control: &str) -> Option<u8> {
        self.levels.read().get(control).copied()
    }

    /// Every successful write so far
    pub fn writes(&self) -> Vec<(String, u8)> {
        self.writes.lock().clone()
    }

    /// Last value written to `control`, if any
    pub fn last_write(&self, control: &str) -> Option<u8> {
        self.writes
            .lock()
            .iter()
            .rev()
            .find(|(name, _)| name == control)
            .map(|(_, value)| *value)
    }

    /// Forget the write log
    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    fn check(&self, control: &str) -> Result<(), BackendError> {
        if self.failing.read().contains(control) {
            return Err(BackendError::Simulated(control.to_string()));
        }
        Ok(())
    }
}

impl GainBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_level(&self, control: &str) -> Result<u8, BackendError> {
        self.check(control)?;
        self.levels
            .read()
            .get(control)
            .copied()
            .ok_or_else(|| BackendError::UnknownControl(control.to_string()))
    }

    fn set_level(&self, control: &str, value: u8) -> Result<(), BackendError> {
        self.check(control)?;
        let value = value.min(MAX_LEVEL);
        {
            let mut levels = self.levels.write();
            let level = levels
                .get_mut(control)
                .ok_or_else(|| BackendError::UnknownControl(control.to_string()))?;
            *level = value;
        }
        self.writes.lock().push((control.to_string(), value));
        trace!(control, value, "memory backend write");
        Ok(())
    }

    fn list_controls(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.order.clone())
    }
}
