//! Per-user concurrency control.
//!
//! Turns for different users run in parallel; turns for the same user are
//! serialized. A second request waits for the in-flight turn to finish.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-user turn locks. Each user id maps to a `Semaphore(1)`;
/// holding the permit grants exclusive turn execution.
pub struct UserLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for UserLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn lock for a user; waits until the current turn
    /// finishes. The permit auto-releases on drop.
    pub async fn acquire(
        &self,
        user_id: &str,
    ) -> Result<OwnedSemaphorePermit, LockClosed> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned().await.map_err(|_| LockClosed)
    }

    pub fn user_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop locks for users with no turn in flight.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// The lock semaphore was closed. Never constructed in practice; turn
/// semaphores live as long as the map.
#[derive(Debug)]
pub struct LockClosed;

impl std::fmt::Display for LockClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn lock closed while waiting")
    }
}

impl std::error::Error for LockClosed {}
