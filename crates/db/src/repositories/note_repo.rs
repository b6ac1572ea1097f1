//! Repository for the `notes` table.

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use notices_core::lifecycle::NoteStatus;
use notices_core::types::{DbId, Timestamp};

use crate::models::note::{CreateNote, Note, NoteRow};
use crate::store::StoreResult;

/// Column list for `notes` queries.
const COLUMNS: &str = "\
    id, title, body, note_type, author_id, department, status, \
    current_approver_id, approval_step, recipient_ids, attachments, \
    scheduled_at, sent_at, version, created_at, updated_at";

/// Provides CRUD and lifecycle operations for notes.
pub struct NoteRepo;

impl NoteRepo {
    /// Insert a new DRAFT note, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateNote) -> StoreResult<Note> {
        let query = format!(
            "INSERT INTO notes \
                (title, body, note_type, author_id, department, status, recipient_ids, attachments) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, NoteRow>(&query)
            .bind(&input.title)
            .bind(&input.body)
            .bind(input.note_type.as_str())
            .bind(input.author_id)
            .bind(&input.department)
            .bind(NoteStatus::Draft.as_str())
            .bind(&input.recipient_ids)
            .bind(Json(&input.attachments))
            .fetch_one(pool)
            .await?;
        row.try_into()
    }

    /// Find a note by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> StoreResult<Option<Note>> {
        let query = format!("SELECT {COLUMNS} FROM notes WHERE id = $1");
        sqlx::query_as::<_, NoteRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Note::try_from)
            .transpose()
    }

    /// Check whether a note row exists (used to tell a version conflict from
    /// a missing row).
    pub async fn exists(conn: &mut PgConnection, id: DbId) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM notes WHERE id = $1)")
            .bind(id)
            .fetch_one(conn)
            .await?;
        Ok(exists)
    }

    /// Write edited content if the version still matches.
    ///
    /// Returns `None` when no row matched `(id, expected_version)`.
    pub async fn update_content(
        conn: &mut PgConnection,
        note: &Note,
        expected_version: i64,
    ) -> StoreResult<Option<Note>> {
        let query = format!(
            "UPDATE notes SET \
                title = $3, body = $4, note_type = $5, recipient_ids = $6, attachments = $7, \
                version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NoteRow>(&query)
            .bind(note.id)
            .bind(expected_version)
            .bind(&note.title)
            .bind(&note.body)
            .bind(note.note_type.as_str())
            .bind(&note.recipient_ids)
            .bind(Json(&note.attachments))
            .fetch_optional(conn)
            .await?
            .map(Note::try_from)
            .transpose()
    }

    /// Write the lifecycle fields if the version still matches.
    ///
    /// Returns `None` when no row matched `(id, expected_version)`.
    pub async fn apply_transition(
        conn: &mut PgConnection,
        note: &Note,
        expected_version: i64,
    ) -> StoreResult<Option<Note>> {
        let query = format!(
            "UPDATE notes SET \
                status = $3, current_approver_id = $4, approval_step = $5, \
                scheduled_at = $6, sent_at = $7, \
                version = version + 1, updated_at = $8 \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NoteRow>(&query)
            .bind(note.id)
            .bind(expected_version)
            .bind(note.status.as_str())
            .bind(note.current_approver_id)
            .bind(note.approval_step)
            .bind(note.scheduled_at)
            .bind(note.sent_at)
            .bind(note.updated_at)
            .fetch_optional(conn)
            .await?
            .map(Note::try_from)
            .transpose()
    }

    /// Delete a note if the version still matches. Returns `true` if deleted.
    pub async fn delete(
        conn: &mut PgConnection,
        id: DbId,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(expected_version)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List SCHEDULED notes due at `now`, oldest schedule first.
    pub async fn list_due(pool: &PgPool, now: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        let query = format!(
            "SELECT {COLUMNS} FROM notes \
             WHERE status = $1 AND scheduled_at <= $2 \
             ORDER BY scheduled_at ASC, id ASC \
             LIMIT $3"
        );
        Self::fetch_notes(
            sqlx::query_as::<_, NoteRow>(&query)
                .bind(NoteStatus::Scheduled.as_str())
                .bind(now)
                .bind(limit)
                .fetch_all(pool)
                .await?,
        )
    }

    /// List notes awaiting validation by `approver_id`, oldest first.
    pub async fn list_pending_for(pool: &PgPool, approver_id: DbId) -> StoreResult<Vec<Note>> {
        let query = format!(
            "SELECT {COLUMNS} FROM notes \
             WHERE status = $1 AND current_approver_id = $2 \
             ORDER BY updated_at ASC, id ASC"
        );
        Self::fetch_notes(
            sqlx::query_as::<_, NoteRow>(&query)
                .bind(NoteStatus::PendingValidation.as_str())
                .bind(approver_id)
                .fetch_all(pool)
                .await?,
        )
    }

    /// List notes pending validation since before `before`.
    pub async fn list_pending_since(
        pool: &PgPool,
        before: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<Note>> {
        let query = format!(
            "SELECT {COLUMNS} FROM notes \
             WHERE status = $1 AND updated_at <= $2 \
             ORDER BY updated_at ASC, id ASC \
             LIMIT $3"
        );
        Self::fetch_notes(
            sqlx::query_as::<_, NoteRow>(&query)
                .bind(NoteStatus::PendingValidation.as_str())
                .bind(before)
                .bind(limit)
                .fetch_all(pool)
                .await?,
        )
    }

    /// List SENT notes where some recipient has no delivery record yet.
    pub async fn list_undelivered(pool: &PgPool, limit: i64) -> StoreResult<Vec<Note>> {
        let query = format!(
            "SELECT {COLUMNS} FROM notes n \
             WHERE n.status = $1 \
               AND EXISTS ( \
                   SELECT 1 FROM unnest(n.recipient_ids) AS r(recipient_id) \
                   WHERE NOT EXISTS ( \
                       SELECT 1 FROM delivery_records d \
                       WHERE d.note_id = n.id AND d.recipient_id = r.recipient_id \
                   ) \
               ) \
             ORDER BY n.sent_at ASC, n.id ASC \
             LIMIT $2"
        );
        Self::fetch_notes(
            sqlx::query_as::<_, NoteRow>(&query)
                .bind(NoteStatus::Sent.as_str())
                .bind(limit)
                .fetch_all(pool)
                .await?,
        )
    }

    fn fetch_notes(rows: Vec<NoteRow>) -> StoreResult<Vec<Note>> {
        rows.into_iter().map(Note::try_from).collect()
    }
}
