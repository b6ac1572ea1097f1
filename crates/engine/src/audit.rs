//! Read side of the audit log.
//!
//! Entries are only ever written by the workflow's transition commits; this
//! type exposes history queries.

use std::sync::Arc;

use notices_core::error::CoreError;
use notices_core::types::DbId;
use notices_db::models::AuditEntry;
use notices_db::AuditStore;

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Every entry for `note_id`, oldest first. Deleted notes keep their
    /// history, ending in a DELETE tombstone.
    pub async fn history(&self, note_id: DbId) -> Result<Vec<AuditEntry>, CoreError> {
        Ok(self.store.history(note_id).await?)
    }
}
