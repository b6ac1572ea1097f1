//! Delivery record models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use notices_core::delivery::{DeliveryState, DeliveryStatus};
use notices_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// Per-recipient read/archive state of a sent note, keyed by
/// `(note_id, recipient_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRecord {
    pub note_id: DbId,
    pub recipient_id: DbId,
    pub state: DeliveryState,
    pub delivered_at: Timestamp,
    pub read_at: Option<Timestamp>,
    pub archived_at: Option<Timestamp>,
}

impl DeliveryRecord {
    pub fn status(&self) -> DeliveryStatus {
        DeliveryStatus {
            state: self.state,
            read_at: self.read_at,
            archived_at: self.archived_at,
        }
    }

    pub fn with_status(&self, status: DeliveryStatus) -> Self {
        Self {
            state: status.state,
            read_at: status.read_at,
            archived_at: status.archived_at,
            ..self.clone()
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DeliveryRow {
    pub note_id: DbId,
    pub recipient_id: DbId,
    pub state: String,
    pub delivered_at: Timestamp,
    pub read_at: Option<Timestamp>,
    pub archived_at: Option<Timestamp>,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            note_id: row.note_id,
            recipient_id: row.recipient_id,
            state: parse_column("state", &row.state)?,
            delivered_at: row.delivered_at,
            read_at: row.read_at,
            archived_at: row.archived_at,
        })
    }
}

/// DTO for materializing an UNREAD delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDelivery {
    pub note_id: DbId,
    pub recipient_id: DbId,
    pub delivered_at: Timestamp,
}
