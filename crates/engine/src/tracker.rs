//! Recipient-side read/archive tracking for sent notes.
//!
//! Every operation is scoped to the calling recipient: acting on another
//! user's record is `Forbidden`, an unknown record is `NotFound`. State
//! changes are compare-and-set on the stored state and retried briefly when
//! two calls by the same recipient race.

use std::sync::Arc;

use chrono::Utc;
use notices_core::delivery::{DeliveryState, DeliveryStatus};
use notices_core::error::CoreError;
use notices_core::roles::Actor;
use notices_core::types::{DbId, Timestamp};
use notices_db::models::DeliveryRecord;
use notices_db::DeliveryStore;

/// Attempts before a racing update gives up with `Conflict`.
const CAS_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct DeliveryTracker {
    store: Arc<dyn DeliveryStore>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn DeliveryStore>) -> Self {
        Self { store }
    }

    /// UNREAD -> READ. No-op (with `read_at` unchanged) when already READ
    /// or ARCHIVED.
    pub async fn mark_read(
        &self,
        actor: &Actor,
        note_id: DbId,
        recipient_id: DbId,
    ) -> Result<DeliveryRecord, CoreError> {
        self.apply(actor, note_id, recipient_id, |status, now| {
            status.mark_read(now)
        })
        .await
    }

    /// Move to ARCHIVED, remembering whether the note had been read.
    pub async fn archive(
        &self,
        actor: &Actor,
        note_id: DbId,
        recipient_id: DbId,
    ) -> Result<DeliveryRecord, CoreError> {
        self.apply(actor, note_id, recipient_id, |status, now| {
            status.archive(now)
        })
        .await
    }

    /// Leave ARCHIVED: back to READ if it had been read, else UNREAD.
    pub async fn unarchive(
        &self,
        actor: &Actor,
        note_id: DbId,
        recipient_id: DbId,
    ) -> Result<DeliveryRecord, CoreError> {
        self.apply(actor, note_id, recipient_id, |status, _| status.unarchive())
            .await
    }

    /// Number of UNREAD records for the recipient.
    pub async fn unread_count_for(&self, recipient_id: DbId) -> Result<i64, CoreError> {
        Ok(self.store.unread_delivery_count(recipient_id).await?)
    }

    /// The caller's delivered notes, newest first, optionally filtered by
    /// state.
    pub async fn inbox(
        &self,
        actor: &Actor,
        state: Option<DeliveryState>,
    ) -> Result<Vec<DeliveryRecord>, CoreError> {
        Ok(self.store.list_for_recipient(actor.id, state).await?)
    }

    /// Delivery records of one note, for the dispatcher and admin views.
    pub async fn records_for_note(&self, note_id: DbId) -> Result<Vec<DeliveryRecord>, CoreError> {
        Ok(self.store.list_for_note(note_id).await?)
    }

    async fn apply<F>(
        &self,
        actor: &Actor,
        note_id: DbId,
        recipient_id: DbId,
        transition: F,
    ) -> Result<DeliveryRecord, CoreError>
    where
        F: Fn(&DeliveryStatus, Timestamp) -> Option<DeliveryStatus>,
    {
        if actor.id != recipient_id {
            return Err(CoreError::Forbidden(format!(
                "user {} may not change deliveries of user {recipient_id}",
                actor.id
            )));
        }

        for _ in 0..CAS_ATTEMPTS {
            let record = self
                .store
                .find_delivery(note_id, recipient_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "delivery",
                    id: note_id,
                })?;

            let Some(next) = transition(&record.status(), Utc::now()) else {
                return Ok(record);
            };
            let updated = record.with_status(next);
            if self.store.update_delivery(&updated, record.state).await? {
                tracing::debug!(
                    note_id,
                    recipient_id,
                    from = %record.state,
                    to = %updated.state,
                    "Delivery state changed"
                );
                return Ok(updated);
            }
        }

        Err(CoreError::Conflict(format!(
            "delivery of note {note_id} to {recipient_id} keeps changing"
        )))
    }
}
