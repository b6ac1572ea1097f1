//! PostgreSQL implementation of the storage traits.

use async_trait::async_trait;
use notices_core::delivery::DeliveryState;
use notices_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::{
    AuditEntry, CreateAuditEntry, CreateDelivery, CreateNote, CreateNotification, DeliveryRecord,
    Note, Notification,
};
use crate::repositories::{AuditRepo, DeliveryRepo, NoteRepo, NotificationRepo};
use crate::store::{
    AuditStore, DeliveryStore, NoteStore, NotificationStore, StoreError, StoreResult,
};

/// Storage backed by a shared `sqlx` connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Tell a stale version apart from a missing row after a guarded write
/// matched nothing.
async fn missed_write(
    conn: &mut sqlx::PgConnection,
    id: DbId,
    expected_version: i64,
) -> StoreError {
    match NoteRepo::exists(conn, id).await {
        Ok(true) => StoreError::VersionConflict {
            entity: "note",
            id,
            expected: expected_version,
        },
        Ok(false) => StoreError::NotFound { entity: "note", id },
        Err(e) => e,
    }
}

#[async_trait]
impl NoteStore for PgStore {
    async fn create_note(&self, input: &CreateNote) -> StoreResult<Note> {
        NoteRepo::create(&self.pool, input).await
    }

    async fn find_note(&self, id: DbId) -> StoreResult<Option<Note>> {
        NoteRepo::find_by_id(&self.pool, id).await
    }

    async fn update_content(&self, note: &Note, expected_version: i64) -> StoreResult<Note> {
        let mut conn = self.pool.acquire().await?;
        match NoteRepo::update_content(&mut *conn, note, expected_version).await? {
            Some(updated) => Ok(updated),
            None => Err(missed_write(&mut *conn, note.id, expected_version).await),
        }
    }

    async fn commit_transition(
        &self,
        note: &Note,
        expected_version: i64,
        entry: &CreateAuditEntry,
    ) -> StoreResult<(Note, AuditEntry)> {
        let mut tx = self.pool.begin().await?;

        let Some(updated) = NoteRepo::apply_transition(&mut *tx, note, expected_version).await?
        else {
            let err = missed_write(&mut *tx, note.id, expected_version).await;
            tx.rollback().await?;
            return Err(err);
        };
        let recorded = AuditRepo::record_action(&mut *tx, entry).await?;

        tx.commit().await?;
        Ok((updated, recorded))
    }

    async fn delete_note(
        &self,
        id: DbId,
        expected_version: i64,
        tombstone: &CreateAuditEntry,
    ) -> StoreResult<AuditEntry> {
        let mut tx = self.pool.begin().await?;

        if !NoteRepo::delete(&mut *tx, id, expected_version).await? {
            let err = missed_write(&mut *tx, id, expected_version).await;
            tx.rollback().await?;
            return Err(err);
        }
        let recorded = AuditRepo::record_action(&mut *tx, tombstone).await?;

        tx.commit().await?;
        Ok(recorded)
    }

    async fn list_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        NoteRepo::list_due(&self.pool, now, limit).await
    }

    async fn list_pending_for(&self, approver_id: DbId) -> StoreResult<Vec<Note>> {
        NoteRepo::list_pending_for(&self.pool, approver_id).await
    }

    async fn list_pending_since(&self, before: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        NoteRepo::list_pending_since(&self.pool, before, limit).await
    }

    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Note>> {
        NoteRepo::list_undelivered(&self.pool, limit).await
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn history(&self, note_id: DbId) -> StoreResult<Vec<AuditEntry>> {
        AuditRepo::list_for_note(&self.pool, note_id).await
    }
}

#[async_trait]
impl DeliveryStore for PgStore {
    async fn create_delivery(&self, input: &CreateDelivery) -> StoreResult<bool> {
        DeliveryRepo::create(&self.pool, input).await
    }

    async fn find_delivery(
        &self,
        note_id: DbId,
        recipient_id: DbId,
    ) -> StoreResult<Option<DeliveryRecord>> {
        DeliveryRepo::find(&self.pool, note_id, recipient_id).await
    }

    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryState,
    ) -> StoreResult<bool> {
        DeliveryRepo::update_state(&self.pool, record, expected).await
    }

    async fn list_for_recipient(
        &self,
        recipient_id: DbId,
        state: Option<DeliveryState>,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        DeliveryRepo::list_for_recipient(&self.pool, recipient_id, state).await
    }

    async fn list_for_note(&self, note_id: DbId) -> StoreResult<Vec<DeliveryRecord>> {
        DeliveryRepo::list_for_note(&self.pool, note_id).await
    }

    async fn unread_delivery_count(&self, recipient_id: DbId) -> StoreResult<i64> {
        DeliveryRepo::unread_count(&self.pool, recipient_id).await
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> StoreResult<Option<Notification>> {
        NotificationRepo::create(&self.pool, input).await
    }

    async fn find_notification(&self, id: DbId) -> StoreResult<Option<Notification>> {
        NotificationRepo::find_by_id(&self.pool, id).await
    }

    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        NotificationRepo::list_for_user(&self.pool, user_id, unread_only, limit, offset).await
    }

    async fn mark_read(&self, id: DbId, user_id: DbId, at: Timestamp) -> StoreResult<bool> {
        NotificationRepo::mark_read(&self.pool, id, user_id, at).await
    }

    async fn mark_all_read(&self, user_id: DbId, at: Timestamp) -> StoreResult<u64> {
        NotificationRepo::mark_all_read(&self.pool, user_id, at).await
    }

    async fn unread_notification_count(&self, user_id: DbId) -> StoreResult<i64> {
        NotificationRepo::unread_count(&self.pool, user_id).await
    }

    async fn delete_read_before(&self, cutoff: Timestamp) -> StoreResult<u64> {
        NotificationRepo::delete_read_before(&self.pool, cutoff).await
    }
}
