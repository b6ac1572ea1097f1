//! Schedule dispatcher: turns due SCHEDULED notes into SENT notes with one
//! UNREAD delivery record per recipient.
//!
//! For each due note the sweep takes the note lock (skipping the note until
//! the next tick when it is busy), commits SCHEDULED -> SENT, materializes
//! delivery records, and fans out `NEW_NOTE`. Delivery records are retried
//! per recipient; the SENT commit is never repeated. A repair pass finishes
//! materialization for SENT notes left incomplete, e.g. by a crash between
//! the commit and the inserts. Each sweep also re-drives notifications that
//! exhausted their attempts earlier, whichever operation produced them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notices_core::error::CoreError;
use notices_core::lifecycle::NoteAction;
use notices_core::types::{DbId, Timestamp};
use notices_db::models::{CreateDelivery, Note};
use notices_db::{DeliveryStore, NoteStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, MIN_TICK};
use crate::locks::NoteLocks;
use crate::notifier::NotificationDispatcher;
use crate::workflow::NoteWorkflow;

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Notes this dispatcher moved to SENT.
    pub sent: Vec<DbId>,
    /// Notes skipped because their lock was busy or another dispatcher got
    /// there first.
    pub skipped: Vec<DbId>,
    /// SENT notes whose missing delivery records were created.
    pub repaired: Vec<DbId>,
    /// `(note, recipient)` pairs still lacking a delivery record after all
    /// attempts.
    pub undelivered: Vec<(DbId, DbId)>,
    /// `(note, recipient)` pairs whose earlier failed notification was
    /// created by this sweep.
    pub renotified: Vec<(DbId, DbId)>,
}

pub struct ScheduleDispatcher {
    workflow: Arc<NoteWorkflow>,
    notes: Arc<dyn NoteStore>,
    deliveries: Arc<dyn DeliveryStore>,
    notifier: Arc<NotificationDispatcher>,
    locks: Arc<NoteLocks>,
    interval: Duration,
    batch_size: i64,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ScheduleDispatcher {
    pub fn new(
        workflow: Arc<NoteWorkflow>,
        notes: Arc<dyn NoteStore>,
        deliveries: Arc<dyn DeliveryStore>,
        notifier: Arc<NotificationDispatcher>,
        locks: Arc<NoteLocks>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            workflow,
            notes,
            deliveries,
            notifier,
            locks,
            interval: config.dispatch_interval,
            batch_size: config.dispatch_batch_size,
            max_attempts: config.delivery_max_attempts.max(1),
            retry_delay: config.delivery_retry_delay,
        }
    }

    /// Run the dispatch loop until `cancel` is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Schedule dispatcher started"
        );

        let mut interval = tokio::time::interval(self.interval.max(MIN_TICK));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Schedule dispatcher stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) => {
                            if !report.sent.is_empty()
                                || !report.repaired.is_empty()
                                || !report.renotified.is_empty()
                            {
                                tracing::info!(
                                    sent = report.sent.len(),
                                    repaired = report.repaired.len(),
                                    skipped = report.skipped.len(),
                                    undelivered = report.undelivered.len(),
                                    renotified = report.renotified.len(),
                                    "Dispatch sweep finished"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Dispatch sweep failed");
                        }
                    }
                }
            }
        }
    }

    /// Re-drive queued notifications, dispatch every note due at `now`, then
    /// repair incomplete deliveries.
    pub async fn sweep(&self, now: Timestamp) -> Result<SweepReport, CoreError> {
        // Only failures from earlier work; this sweep's own land next tick.
        let renotified = self
            .notifier
            .redrive()
            .await
            .created
            .into_iter()
            .map(|n| (n.related_note_id, n.recipient_id))
            .collect();
        let mut report = SweepReport {
            renotified,
            ..SweepReport::default()
        };

        let due = self.notes.list_due(now, self.batch_size).await?;
        for note in &due {
            self.dispatch(note.id, now, &mut report).await;
        }

        let incomplete = self.notes.list_undelivered(self.batch_size).await?;
        for note in &incomplete {
            if report.sent.contains(&note.id) {
                continue;
            }
            self.repair(note, now, &mut report).await;
        }

        Ok(report)
    }

    async fn dispatch(&self, note_id: DbId, now: Timestamp, report: &mut SweepReport) {
        let _guard = match self.locks.acquire(note_id).await {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(note_id, "Note busy, dispatch deferred to next tick");
                report.skipped.push(note_id);
                return;
            }
        };

        let sent = match self.workflow.mark_sent(note_id, now).await {
            Ok(note) => note,
            Err(
                e @ (CoreError::Conflict(_)
                | CoreError::InvalidTransition(_)
                | CoreError::NotFound { .. }),
            ) => {
                // Another dispatcher or an archive got there first.
                tracing::debug!(note_id, error = %e, "Note no longer dispatchable");
                report.skipped.push(note_id);
                return;
            }
            Err(e) => {
                tracing::error!(note_id, error = %e, "Failed to mark note sent");
                report.skipped.push(note_id);
                return;
            }
        };

        let missing = self.materialize(&sent, now).await;
        report
            .undelivered
            .extend(missing.into_iter().map(|recipient_id| (note_id, recipient_id)));
        self.notifier.on_transition(&sent, NoteAction::Send).await;
        report.sent.push(note_id);
    }

    async fn repair(&self, note: &Note, now: Timestamp, report: &mut SweepReport) {
        let Ok(_guard) = self.locks.acquire(note.id).await else {
            report.skipped.push(note.id);
            return;
        };

        let delivered_at = note.sent_at.unwrap_or(now);
        let missing = self.materialize(note, delivered_at).await;
        tracing::info!(
            note_id = note.id,
            still_missing = missing.len(),
            "Repaired delivery records"
        );
        report
            .undelivered
            .extend(missing.into_iter().map(|recipient_id| (note.id, recipient_id)));
        self.notifier.on_transition(note, NoteAction::Send).await;
        report.repaired.push(note.id);
    }

    /// Create one UNREAD record per recipient. Returns the recipients whose
    /// record could not be created after all attempts.
    async fn materialize(&self, note: &Note, delivered_at: Timestamp) -> Vec<DbId> {
        let mut missing = Vec::new();
        for &recipient_id in &note.recipient_ids {
            let input = CreateDelivery {
                note_id: note.id,
                recipient_id,
                delivered_at,
            };
            if let Err(e) = self.create_with_retry(&input).await {
                tracing::error!(
                    note_id = note.id,
                    recipient_id,
                    error = %e,
                    "Delivery record could not be created"
                );
                missing.push(recipient_id);
            }
        }
        missing
    }

    async fn create_with_retry(&self, input: &CreateDelivery) -> Result<bool, StoreError> {
        let mut attempt = 1;
        loop {
            match self.deliveries.create_delivery(input).await {
                Ok(created) => return Ok(created),
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        note_id = input.note_id,
                        recipient_id = input.recipient_id,
                        error = %e,
                        "Delivery attempt failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
