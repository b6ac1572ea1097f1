//! Repository for the `delivery_records` table.

use sqlx::PgPool;
use notices_core::delivery::DeliveryState;
use notices_core::types::DbId;

use crate::models::delivery::{CreateDelivery, DeliveryRecord, DeliveryRow};
use crate::store::StoreResult;

/// Column list for `delivery_records` queries.
const COLUMNS: &str = "note_id, recipient_id, state, delivered_at, read_at, archived_at";

/// Provides per-recipient delivery operations.
pub struct DeliveryRepo;

impl DeliveryRepo {
    /// Insert an UNREAD record. Returns `false` if one already exists for the
    /// `(note_id, recipient_id)` pair.
    pub async fn create(pool: &PgPool, input: &CreateDelivery) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO delivery_records (note_id, recipient_id, state, delivered_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (note_id, recipient_id) DO NOTHING",
        )
        .bind(input.note_id)
        .bind(input.recipient_id)
        .bind(DeliveryState::Unread.as_str())
        .bind(input.delivered_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find(
        pool: &PgPool,
        note_id: DbId,
        recipient_id: DbId,
    ) -> StoreResult<Option<DeliveryRecord>> {
        let query = format!(
            "SELECT {COLUMNS} FROM delivery_records WHERE note_id = $1 AND recipient_id = $2"
        );
        sqlx::query_as::<_, DeliveryRow>(&query)
            .bind(note_id)
            .bind(recipient_id)
            .fetch_optional(pool)
            .await?
            .map(DeliveryRecord::try_from)
            .transpose()
    }

    /// Compare-and-set on `state`. Returns `true` if the row was updated.
    pub async fn update_state(
        pool: &PgPool,
        record: &DeliveryRecord,
        expected: DeliveryState,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE delivery_records SET state = $3, read_at = $4, archived_at = $5 \
             WHERE note_id = $1 AND recipient_id = $2 AND state = $6",
        )
        .bind(record.note_id)
        .bind(record.recipient_id)
        .bind(record.state.as_str())
        .bind(record.read_at)
        .bind(record.archived_at)
        .bind(expected.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// A recipient's inbox, newest delivery first, optionally filtered by state.
    pub async fn list_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
        state: Option<DeliveryState>,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        let query = format!(
            "SELECT {COLUMNS} FROM delivery_records \
             WHERE recipient_id = $1 AND ($2::TEXT IS NULL OR state = $2) \
             ORDER BY delivered_at DESC, note_id DESC"
        );
        sqlx::query_as::<_, DeliveryRow>(&query)
            .bind(recipient_id)
            .bind(state.map(|s| s.as_str()))
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(DeliveryRecord::try_from)
            .collect()
    }

    pub async fn list_for_note(pool: &PgPool, note_id: DbId) -> StoreResult<Vec<DeliveryRecord>> {
        let query = format!(
            "SELECT {COLUMNS} FROM delivery_records \
             WHERE note_id = $1 \
             ORDER BY recipient_id ASC"
        );
        sqlx::query_as::<_, DeliveryRow>(&query)
            .bind(note_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(DeliveryRecord::try_from)
            .collect()
    }

    /// Count of UNREAD records for a recipient.
    pub async fn unread_count(pool: &PgPool, recipient_id: DbId) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM delivery_records WHERE recipient_id = $1 AND state = $2",
        )
        .bind(recipient_id)
        .bind(DeliveryState::Unread.as_str())
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
