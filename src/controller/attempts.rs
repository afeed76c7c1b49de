//! Per-resource attempt counters
//!
//! One tracker is owned by each application instance and shared by every
//! identity of that kind. The lock is held only for the map access.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::ResourceId;

/// Value reported for identities the tracker does not know
pub const NOT_TRACKED: u32 = 9999;

/// Mutex-guarded attempt counter table
#[derive(Debug, Default)]
pub struct AttemptTracker {
    attempts: Mutex<HashMap<ResourceId, u32>>,
}

impl AttemptTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id` at zero; a tracked id keeps its count
    pub fn init(&self, id: &ResourceId) {
        self.attempts.lock().entry(id.clone()).or_insert(0);
    }

    /// Stop tracking `id`
    pub fn delete(&self, id: &ResourceId) {
        self.attempts.lock().remove(id);
    }

    /// Set a tracked id back to zero
    pub fn reset(&self, id: &ResourceId) {
        if let Some(count) = self.attempts.lock().get_mut(id) {
            *count = 0;
        }
    }

    /// Current count, or [`NOT_TRACKED`]
    pub fn get(&self, id: &ResourceId) -> u32 {
        self.attempts
            .lock()
            .get(id)
            .copied()
            .unwrap_or(NOT_TRACKED)
    }

    /// Bump a tracked id; untracked ids stay untracked
    pub fn increment(&self, id: &ResourceId) {
        if let Some(count) = self.attempts.lock().get_mut(id) {
            *count += 1;
        }
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.attempts.lock().is_empty()
    }
}
