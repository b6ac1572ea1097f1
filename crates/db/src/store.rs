//! Storage traits consumed by the engine.
//!
//! Writes that must be atomic are single trait calls: a note transition and
//! its audit entry are committed together by
//! [`NoteStore::commit_transition`], guarded by an optimistic version check.

use async_trait::async_trait;
use notices_core::delivery::DeliveryState;
use notices_core::error::CoreError;
use notices_core::types::{DbId, Timestamp};

use crate::models::{
    AuditEntry, CreateAuditEntry, CreateDelivery, CreateNote, CreateNotification, DeliveryRecord,
    Note, Notification,
};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row changed since it was read (optimistic version check failed).
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: DbId,
        expected: i64,
    },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// A stored value could not be mapped back to the domain model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// The backend refused the operation (connection loss, injected fault).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => CoreError::Conflict(err.to_string()),
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::Corrupt(_) | StoreError::Unavailable(_) | StoreError::Database(_) => {
                CoreError::Internal(err.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Notes and their lifecycle commits.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Insert a new DRAFT note at version 1.
    async fn create_note(&self, input: &CreateNote) -> StoreResult<Note>;

    async fn find_note(&self, id: DbId) -> StoreResult<Option<Note>>;

    /// Persist edited content (title, body, type, recipients, attachments)
    /// if the stored version still equals `expected_version`.
    async fn update_content(&self, note: &Note, expected_version: i64) -> StoreResult<Note>;

    /// Persist the lifecycle fields of `note` (status, current approver,
    /// approval step, schedule, sent time) and append `entry` to the audit
    /// log as one atomic unit, if the stored version still equals
    /// `expected_version`.
    async fn commit_transition(
        &self,
        note: &Note,
        expected_version: i64,
        entry: &CreateAuditEntry,
    ) -> StoreResult<(Note, AuditEntry)>;

    /// Remove the note and append a DELETE tombstone atomically.
    async fn delete_note(
        &self,
        id: DbId,
        expected_version: i64,
        tombstone: &CreateAuditEntry,
    ) -> StoreResult<AuditEntry>;

    /// SCHEDULED notes whose `scheduled_at <= now`, oldest first.
    async fn list_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Note>>;

    /// PENDING_VALIDATION notes waiting on `approver_id`.
    async fn list_pending_for(&self, approver_id: DbId) -> StoreResult<Vec<Note>>;

    /// PENDING_VALIDATION notes not touched since `before`.
    async fn list_pending_since(&self, before: Timestamp, limit: i64) -> StoreResult<Vec<Note>>;

    /// SENT notes with at least one recipient lacking a delivery record.
    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Note>>;
}

/// Read side of the append-only audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// History for a note, ordered by `recorded_at` ascending.
    async fn history(&self, note_id: DbId) -> StoreResult<Vec<AuditEntry>>;
}

/// Per-recipient delivery records.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Insert an UNREAD record. Returns `false` if the key already exists.
    async fn create_delivery(&self, input: &CreateDelivery) -> StoreResult<bool>;

    async fn find_delivery(
        &self,
        note_id: DbId,
        recipient_id: DbId,
    ) -> StoreResult<Option<DeliveryRecord>>;

    /// Overwrite the record's state if its stored state is still `expected`.
    /// Returns `false` when the state changed concurrently.
    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryState,
    ) -> StoreResult<bool>;

    async fn list_for_recipient(
        &self,
        recipient_id: DbId,
        state: Option<DeliveryState>,
    ) -> StoreResult<Vec<DeliveryRecord>>;

    async fn list_for_note(&self, note_id: DbId) -> StoreResult<Vec<DeliveryRecord>>;

    async fn unread_delivery_count(&self, recipient_id: DbId) -> StoreResult<i64>;
}

/// User notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification. Returns `None` if one with the same
    /// idempotency key already exists.
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> StoreResult<Option<Notification>>;

    async fn find_notification(&self, id: DbId) -> StoreResult<Option<Notification>>;

    /// Newest first. When `unread_only`, read notifications are skipped.
    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>>;

    /// Returns `true` if an unread notification owned by `user_id` was marked.
    async fn mark_read(&self, id: DbId, user_id: DbId, at: Timestamp) -> StoreResult<bool>;

    async fn mark_all_read(&self, user_id: DbId, at: Timestamp) -> StoreResult<u64>;

    async fn unread_notification_count(&self, user_id: DbId) -> StoreResult<i64>;

    /// Delete read notifications whose `read_at` is before `cutoff`.
    async fn delete_read_before(&self, cutoff: Timestamp) -> StoreResult<u64>;
}
