//! Repository for the append-only `audit_entries` table.

use sqlx::{PgConnection, PgPool};
use notices_core::types::DbId;

use crate::models::audit::{AuditEntry, AuditEntryRow, CreateAuditEntry};
use crate::store::StoreResult;

/// Column list for `audit_entries` queries.
const COLUMNS: &str = "\
    id, note_id, actor_id, action, from_status, to_status, comment, recorded_at";

/// Insert and query operations for audit entries. There is no update or
/// delete.
pub struct AuditRepo;

impl AuditRepo {
    /// Append an entry inside the caller's transaction.
    ///
    /// `recorded_at` is raised to one microsecond past the note's latest
    /// entry when the supplied clock is not ahead of it.
    pub async fn record_action(
        conn: &mut PgConnection,
        input: &CreateAuditEntry,
    ) -> StoreResult<AuditEntry> {
        let query = format!(
            "INSERT INTO audit_entries \
                (note_id, actor_id, action, from_status, to_status, comment, recorded_at) \
             SELECT $1, $2, $3, $4, $5, $6, \
                GREATEST($7, COALESCE( \
                    (SELECT MAX(recorded_at) FROM audit_entries WHERE note_id = $1) \
                        + INTERVAL '1 microsecond', \
                    $7)) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuditEntryRow>(&query)
            .bind(input.note_id)
            .bind(input.actor_id)
            .bind(input.action.as_str())
            .bind(input.from_status.as_str())
            .bind(input.to_status.map(|s| s.as_str()))
            .bind(&input.comment)
            .bind(input.recorded_at)
            .fetch_one(conn)
            .await?;
        row.try_into()
    }

    /// All entries for a note, oldest first.
    pub async fn list_for_note(pool: &PgPool, note_id: DbId) -> StoreResult<Vec<AuditEntry>> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_entries \
             WHERE note_id = $1 \
             ORDER BY recorded_at ASC, id ASC"
        );
        sqlx::query_as::<_, AuditEntryRow>(&query)
            .bind(note_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(AuditEntry::try_from)
            .collect()
    }
}
