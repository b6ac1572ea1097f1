//! Per-note mutual exclusion within one process.
//!
//! Every mutation of a note runs while holding that note's lock. Waiting is
//! bounded by a timeout; on expiry the operation fails with
//! [`CoreError::Busy`] before touching any state. Across processes the
//! store's version check is the authority.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notices_core::error::CoreError;
use notices_core::types::DbId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries are pruned once the map grows past this many idle locks.
const PRUNE_THRESHOLD: usize = 1024;

/// Held for the duration of a note mutation.
pub type NoteGuard = OwnedMutexGuard<()>;

pub struct NoteLocks {
    locks: Mutex<HashMap<DbId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl NoteLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the lock for `note_id`, waiting at most the configured
    /// timeout.
    pub async fn acquire(&self, note_id: DbId) -> Result<NoteGuard, CoreError> {
        let lock = self.lock_for(note_id)?;
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    note_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Note lock timed out"
                );
                CoreError::Busy(format!("note {note_id} is locked by another operation"))
            })
    }

    fn lock_for(&self, note_id: DbId) -> Result<Arc<AsyncMutex<()>>, CoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| CoreError::Internal("note lock table poisoned".into()))?;
        if locks.len() > PRUNE_THRESHOLD {
            // Only this map holds an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Ok(Arc::clone(locks.entry(note_id).or_default()))
    }
}
