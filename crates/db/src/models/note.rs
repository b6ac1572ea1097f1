//! Note entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use notices_core::authz::NoteFacts;
use notices_core::lifecycle::NoteStatus;
use notices_core::notes::{AttachmentRef, NoteType};
use notices_core::types::{DbId, Timestamp};

use super::parse_column;
use crate::store::StoreError;

/// A note and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: DbId,
    pub title: String,
    pub body: String,
    pub note_type: NoteType,
    pub author_id: DbId,
    pub department: String,
    pub status: NoteStatus,
    pub current_approver_id: Option<DbId>,
    /// 0-based index of the current level in the validation chain.
    pub approval_step: i32,
    pub recipient_ids: Vec<DbId>,
    pub attachments: Vec<AttachmentRef>,
    pub scheduled_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    /// Optimistic concurrency counter, incremented on every write.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Note {
    /// The attributes authorization decisions depend on.
    pub fn facts(&self) -> NoteFacts {
        NoteFacts {
            status: self.status,
            author_id: self.author_id,
            current_approver_id: self.current_approver_id,
        }
    }
}

/// A row from the `notes` table.
#[derive(Debug, FromRow)]
pub(crate) struct NoteRow {
    pub id: DbId,
    pub title: String,
    pub body: String,
    pub note_type: String,
    pub author_id: DbId,
    pub department: String,
    pub status: String,
    pub current_approver_id: Option<DbId>,
    pub approval_step: i32,
    pub recipient_ids: Vec<DbId>,
    pub attachments: Json<Vec<AttachmentRef>>,
    pub scheduled_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<NoteRow> for Note {
    type Error = StoreError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            body: row.body,
            note_type: parse_column("note_type", &row.note_type)?,
            author_id: row.author_id,
            department: row.department,
            status: parse_column("status", &row.status)?,
            current_approver_id: row.current_approver_id,
            approval_step: row.approval_step,
            recipient_ids: row.recipient_ids,
            attachments: row.attachments.0,
            scheduled_at: row.scheduled_at,
            sent_at: row.sent_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// DTO for creating a new DRAFT note.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNote {
    pub title: String,
    pub body: String,
    pub note_type: NoteType,
    pub author_id: DbId,
    pub department: String,
    pub recipient_ids: Vec<DbId>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

/// DTO for editing a DRAFT or RETURNED note. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub body: Option<String>,
    pub note_type: Option<NoteType>,
    pub recipient_ids: Option<Vec<DbId>>,
    pub attachments: Option<Vec<AttachmentRef>>,
}
