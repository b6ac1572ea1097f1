//! Reminders for notes stuck in validation.
//!
//! A note that has waited on the same approver for longer than the
//! configured threshold earns that approver a `REMINDER` notification, then
//! one more per further threshold elapsed. Rounds are keyed so each fires at
//! most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notices_core::error::CoreError;
use notices_core::types::Timestamp;
use notices_db::NoteStore;
use tokio_util::sync::CancellationToken;

use crate::config::MIN_TICK;
use crate::notifier::NotificationDispatcher;

pub struct ReminderSweep {
    notes: Arc<dyn NoteStore>,
    notifier: Arc<NotificationDispatcher>,
    after: chrono::Duration,
    batch_size: i64,
}

impl ReminderSweep {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        notifier: Arc<NotificationDispatcher>,
        after: chrono::Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            notes,
            notifier,
            after,
            batch_size,
        }
    }

    /// Send due reminders. Returns the number of notifications created.
    pub async fn sweep(&self, now: Timestamp) -> Result<usize, CoreError> {
        if self.after <= chrono::Duration::zero() {
            return Ok(0);
        }

        let stale = self
            .notes
            .list_pending_since(now - self.after, self.batch_size)
            .await?;

        let mut created = 0;
        for note in &stale {
            let waited = now - note.updated_at;
            let round = waited.num_seconds() / self.after.num_seconds().max(1);
            if round < 1 {
                continue;
            }
            created += self.notifier.remind(note, round).await.created.len();
        }

        if created > 0 {
            tracing::info!(created, "Validation reminders sent");
        }
        Ok(created)
    }

    /// Run the reminder loop until `cancel` is triggered.
    pub async fn run(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        tracing::info!(
            after_hours = self.after.num_hours(),
            interval_secs = every.as_secs(),
            "Reminder sweep started"
        );

        let mut interval = tokio::time::interval(every.max(MIN_TICK));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reminder sweep stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        tracing::error!(error = %e, "Reminder sweep failed");
                    }
                }
            }
        }
    }
}
