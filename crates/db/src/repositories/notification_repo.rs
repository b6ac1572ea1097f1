//! Repository for the `notifications` table.

use sqlx::PgPool;
use notices_core::types::{DbId, Timestamp};

use crate::models::notification::{CreateNotification, Notification, NotificationRow};
use crate::store::StoreResult;

/// Column list for `notifications` queries.
const COLUMNS: &str =
    "id, recipient_id, kind, related_note_id, trigger_key, is_read, created_at, read_at";

/// Provides CRUD operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Create a notification, returning `None` when the idempotency key
    /// already exists.
    pub async fn create(
        pool: &PgPool,
        input: &CreateNotification,
    ) -> StoreResult<Option<Notification>> {
        let query = format!(
            "INSERT INTO notifications \
                (recipient_id, kind, related_note_id, trigger_key, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT uq_notifications_dedupe DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(input.recipient_id)
            .bind(input.kind.as_str())
            .bind(input.related_note_id)
            .bind(&input.trigger_key)
            .bind(input.created_at)
            .fetch_optional(pool)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> StoreResult<Option<Notification>> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    /// List notifications for a user.
    ///
    /// When `unread_only` is `true`, only notifications with `is_read = false`
    /// are returned.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        let filter = if unread_only {
            "AND is_read = false"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE recipient_id = $1 {filter} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect()
    }

    /// Mark a single notification as read. Returns `true` if it was unread
    /// and owned by `user_id`.
    pub async fn mark_read(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
        at: Timestamp,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true, read_at = $3 \
             WHERE id = $1 AND recipient_id = $2 AND is_read = false",
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark all unread notifications for a user as read.
    pub async fn mark_all_read(pool: &PgPool, user_id: DbId, at: Timestamp) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true, read_at = $2 \
             WHERE recipient_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn unread_count(pool: &PgPool, user_id: DbId) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Delete read notifications older than `cutoff`. Returns the number removed.
    pub async fn delete_read_before(pool: &PgPool, cutoff: Timestamp) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE is_read = true AND read_at < $1")
                .bind(cutoff)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
