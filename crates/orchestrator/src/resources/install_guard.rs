//! At most one in-flight install per owner.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Set of owners with an install currently running.
#[derive(Clone, Default)]
pub struct InFlightInstalls {
    owners: Arc<Mutex<HashSet<String>>>,
}

impl InFlightInstalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the owner's install slot, or `None` if it is taken.
    pub fn try_acquire(&self, owner_id: &str) -> Option<InstallGuard> {
        if !self.owners().insert(owner_id.to_string()) {
            return None;
        }

        debug!(owner_id = %owner_id, "Install slot acquired");
        Some(InstallGuard {
            owner_id: owner_id.to_string(),
            installs: self.clone(),
        })
    }

    pub fn is_installing(&self, owner_id: &str) -> bool {
        self.owners().contains(owner_id)
    }

    fn owners(&self) -> MutexGuard<'_, HashSet<String>> {
        self.owners.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Releases the owner's install slot when dropped.
pub struct InstallGuard {
    owner_id: String,
    installs: InFlightInstalls,
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        self.installs.owners().remove(&self.owner_id);
        debug!(owner_id = %self.owner_id, "Install slot released");
    }
}
