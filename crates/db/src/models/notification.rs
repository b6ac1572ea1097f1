//! Notification entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use notices_core::notification::NotificationKind;
use notices_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: DbId,
    pub recipient_id: DbId,
    pub kind: NotificationKind,
    pub related_note_id: DbId,
    /// Identifies the triggering event; part of the idempotency key.
    pub trigger_key: String,
    pub is_read: bool,
    pub created_at: Timestamp,
    pub read_at: Option<Timestamp>,
}

#[derive(Debug, FromRow)]
pub(crate) struct NotificationRow {
    pub id: DbId,
    pub recipient_id: DbId,
    pub kind: String,
    pub related_note_id: DbId,
    pub trigger_key: String,
    pub is_read: bool,
    pub created_at: Timestamp,
    pub read_at: Option<Timestamp>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            kind: parse_column("kind", &row.kind)?,
            related_note_id: row.related_note_id,
            trigger_key: row.trigger_key,
            is_read: row.is_read,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}

/// DTO for creating a notification. Creation is idempotent on
/// `(recipient_id, related_note_id, kind, trigger_key)`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotification {
    pub recipient_id: DbId,
    pub kind: NotificationKind,
    pub related_note_id: DbId,
    pub trigger_key: String,
    pub created_at: Timestamp,
}
