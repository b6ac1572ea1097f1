//! Audit entry models (append-only, no `updated_at`).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use notices_core::lifecycle::{NoteAction, NoteStatus};
use notices_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// A single audit entry. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: DbId,
    pub note_id: DbId,
    /// `None` for system actions (SEND).
    pub actor_id: Option<DbId>,
    pub action: NoteAction,
    pub from_status: NoteStatus,
    /// `None` for DELETE tombstones.
    pub to_status: Option<NoteStatus>,
    pub comment: Option<String>,
    pub recorded_at: Timestamp,
}

#[derive(Debug, FromRow)]
pub(crate) struct AuditEntryRow {
    pub id: DbId,
    pub note_id: DbId,
    pub actor_id: Option<DbId>,
    pub action: String,
    pub from_status: String,
    pub to_status: Option<String>,
    pub comment: Option<String>,
    pub recorded_at: Timestamp,
}

impl TryFrom<AuditEntryRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            note_id: row.note_id,
            actor_id: row.actor_id,
            action: parse_column("action", &row.action)?,
            from_status: parse_column("from_status", &row.from_status)?,
            to_status: row
                .to_status
                .as_deref()
                .map(|s| parse_column("to_status", s))
                .transpose()?,
            comment: row.comment,
            recorded_at: row.recorded_at,
        })
    }
}

/// DTO for recording an audit entry.
///
/// `recorded_at` is a lower bound: the store clamps it to strictly after the
/// note's latest entry so per-note history is totally ordered.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuditEntry {
    pub note_id: DbId,
    pub actor_id: Option<DbId>,
    pub action: NoteAction,
    pub from_status: NoteStatus,
    pub to_status: Option<NoteStatus>,
    pub comment: Option<String>,
    pub recorded_at: Timestamp,
}
