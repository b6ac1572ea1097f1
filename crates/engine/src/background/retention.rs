//! Periodic cleanup of read notifications.
//!
//! Deletes notifications that were read more than the retention window ago.
//! Unread notifications are never removed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notices_core::error::CoreError;
use notices_core::types::Timestamp;
use notices_db::NotificationStore;
use tokio_util::sync::CancellationToken;

use crate::config::MIN_TICK;

/// Delete notifications read before `now - retention`. Returns the number
/// removed.
pub async fn purge(
    store: &dyn NotificationStore,
    now: Timestamp,
    retention: chrono::Duration,
) -> Result<u64, CoreError> {
    Ok(store.delete_read_before(now - retention).await?)
}

/// Run the retention cleanup loop until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn NotificationStore>,
    retention: chrono::Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_days = retention.num_days(),
        interval_secs = every.as_secs(),
        "Notification retention job started"
    );

    let mut interval = tokio::time::interval(every.max(MIN_TICK));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Notification retention job stopping");
                break;
            }
            _ = interval.tick() => {
                match purge(store.as_ref(), Utc::now(), retention).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Notification retention: purged old rows");
                        } else {
                            tracing::debug!("Notification retention: no rows to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Notification retention: cleanup failed");
                    }
                }
            }
        }
    }
}
