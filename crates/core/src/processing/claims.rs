//! Per-target mutual exclusion.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of targets currently being processed.
#[derive(Debug, Clone, Default)]
pub struct ClaimTable {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl ClaimTable {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding this lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomically claim `target`. Returns `None` if it is already claimed.
    pub fn try_claim(&self, target: &str) -> Option<ClaimGuard> {
        if self.lock().insert(target.to_string()) {
            Some(ClaimGuard {
                table: self.clone(),
                target: target.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_claimed(&self, target: &str) -> bool {
        self.lock().contains(target)
    }

    /// Number of targets currently claimed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, target: &str) {
        self.lock().remove(target);
    }
}

/// Holds a claim on one target; dropping it releases the claim.
#[derive(Debug)]
pub struct ClaimGuard {
    table: ClaimTable,
    target: String,
}

impl ClaimGuard {
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.table.release(&self.target);
    }
}
