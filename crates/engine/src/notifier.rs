//! Notification fan-out and recipient-side notification operations.
//!
//! | Event                         | Recipients                      | Kind                  |
//! |-------------------------------|---------------------------------|-----------------------|
//! | submit                        | current approver                | `VALIDATION_REQUIRED` |
//! | approve, chain advanced       | new current approver            | `VALIDATION_REQUIRED` |
//! | approve, final                | author                          | `NOTE_APPROVED`       |
//! | return                        | author                          | `NOTE_RETURNED`       |
//! | send                          | every recipient                 | `NEW_NOTE`            |
//! | comment added                 | author + prior commenters       | `COMMENT_ADDED`       |
//! | reminder sweep                | current approver                | `REMINDER`            |
//!
//! Creation is idempotent per `(recipient, note, kind, trigger)`. Each
//! recipient is attempted independently with bounded retries. A notification
//! whose attempts are all exhausted is queued and re-driven by
//! [`NotificationDispatcher::redrive`] on the next dispatcher sweep.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notices_core::error::CoreError;
use notices_core::lifecycle::NoteAction;
use notices_core::notification::{route_transition, Audience, NotificationKind};
use notices_core::types::DbId;
use notices_db::models::{CreateNotification, Note, Notification};
use notices_db::{NotificationStore, StoreError};
use notices_events::{EventBus, NoteEvent};
use tokio::sync::Mutex;

/// Upper bound on a single notification page.
const MAX_PAGE_SIZE: i64 = 100;

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct FanOut {
    /// Newly created notifications.
    pub created: Vec<Notification>,
    /// Recipients that already had this notification.
    pub duplicates: usize,
    /// Recipients for which every attempt failed.
    pub failed: Vec<DbId>,
}

/// Trigger key for notifications produced by a transition commit.
fn version_trigger(version: i64) -> String {
    format!("v{version}")
}

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    bus: Arc<EventBus>,
    max_attempts: u32,
    retry_delay: Duration,
    /// Notifications that failed every attempt, awaiting [`Self::redrive`].
    retry_queue: Mutex<Vec<CreateNotification>>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        bus: Arc<EventBus>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            max_attempts: max_attempts.max(1),
            retry_delay,
            retry_queue: Mutex::new(Vec::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Notify the audience of a committed transition. `note` is the state
    /// after the commit.
    pub async fn on_transition(&self, note: &Note, action: NoteAction) -> FanOut {
        let Some((kind, audience)) = route_transition(action, Some(note.status)) else {
            return FanOut::default();
        };
        let recipients: Vec<DbId> = match audience {
            Audience::CurrentApprover => note.current_approver_id.into_iter().collect(),
            Audience::Author => vec![note.author_id],
            Audience::Recipients => note.recipient_ids.clone(),
        };
        self.fan_out(kind, note.id, &recipients, &version_trigger(note.version))
            .await
    }

    /// The chain advanced to the next approver.
    pub async fn on_validation_required(&self, note: &Note) -> FanOut {
        let recipients: Vec<DbId> = note.current_approver_id.into_iter().collect();
        self.fan_out(
            NotificationKind::ValidationRequired,
            note.id,
            &recipients,
            &version_trigger(note.version),
        )
        .await
    }

    /// A comment was posted; the author and earlier commenters hear about
    /// it, except the commenter.
    pub async fn on_comment_added(
        &self,
        note: &Note,
        commenter_id: DbId,
        comment_id: DbId,
        prior_commenter_ids: &[DbId],
    ) -> FanOut {
        let recipients: Vec<DbId> = std::iter::once(note.author_id)
            .chain(prior_commenter_ids.iter().copied())
            .filter(|id| *id != commenter_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.fan_out(
            NotificationKind::CommentAdded,
            note.id,
            &recipients,
            &format!("c{comment_id}"),
        )
        .await
    }

    /// Reminder `round` for the approver a note is waiting on.
    pub async fn remind(&self, note: &Note, round: i64) -> FanOut {
        let recipients: Vec<DbId> = note.current_approver_id.into_iter().collect();
        self.fan_out(
            NotificationKind::Reminder,
            note.id,
            &recipients,
            &format!("v{}-r{round}", note.version),
        )
        .await
    }

    /// Create one `kind` notification per recipient. Failures for one
    /// recipient do not stop the others.
    pub async fn fan_out(
        &self,
        kind: NotificationKind,
        note_id: DbId,
        recipients: &[DbId],
        trigger_key: &str,
    ) -> FanOut {
        let mut outcome = FanOut::default();

        for &recipient_id in recipients {
            let input = CreateNotification {
                recipient_id,
                kind,
                related_note_id: note_id,
                trigger_key: trigger_key.to_string(),
                created_at: Utc::now(),
            };
            self.create_one(input, &mut outcome).await;
        }

        if !outcome.created.is_empty() {
            tracing::debug!(
                note_id,
                kind = %kind,
                created = outcome.created.len(),
                "Notifications created"
            );
        }
        outcome
    }

    /// Retry every queued notification once more. Those that fail again
    /// stay queued for the next call.
    pub async fn redrive(&self) -> FanOut {
        let queued = std::mem::take(&mut *self.retry_queue.lock().await);
        let mut outcome = FanOut::default();
        if queued.is_empty() {
            return outcome;
        }

        let total = queued.len();
        for input in queued {
            self.create_one(input, &mut outcome).await;
        }
        tracing::info!(
            queued = total,
            created = outcome.created.len(),
            still_failing = outcome.failed.len(),
            "Re-drove queued notifications"
        );
        outcome
    }

    /// Number of notifications waiting to be re-driven.
    pub async fn queued_retries(&self) -> usize {
        self.retry_queue.lock().await.len()
    }

    async fn create_one(&self, input: CreateNotification, outcome: &mut FanOut) {
        match self.create_with_retry(&input).await {
            Ok(Some(notification)) => {
                self.bus
                    .publish(NoteEvent::NotificationCreated(notification.clone()));
                outcome.created.push(notification);
            }
            Ok(None) => outcome.duplicates += 1,
            Err(e) => {
                tracing::error!(
                    note_id = input.related_note_id,
                    recipient_id = input.recipient_id,
                    kind = %input.kind,
                    error = %e,
                    "Notification could not be created, queued for retry"
                );
                outcome.failed.push(input.recipient_id);
                self.enqueue(input).await;
            }
        }
    }

    async fn enqueue(&self, input: CreateNotification) {
        let mut queue = self.retry_queue.lock().await;
        let queued = queue.iter().any(|q| {
            q.recipient_id == input.recipient_id
                && q.related_note_id == input.related_note_id
                && q.kind == input.kind
                && q.trigger_key == input.trigger_key
        });
        if !queued {
            queue.push(input);
        }
    }

    async fn create_with_retry(
        &self,
        input: &CreateNotification,
    ) -> Result<Option<Notification>, StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.create_notification(input).await {
                Ok(created) => return Ok(created),
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        recipient_id = input.recipient_id,
                        note_id = input.related_note_id,
                        error = %e,
                        "Notification attempt failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recipient operations
    // -----------------------------------------------------------------------

    /// A page of the user's notifications, newest first.
    pub async fn list(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, CoreError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);
        Ok(self
            .store
            .list_for_user(user_id, unread_only, limit, offset)
            .await?)
    }

    /// Mark one of the user's notifications as read. Repeating is a no-op.
    pub async fn mark_read(&self, user_id: DbId, notification_id: DbId) -> Result<(), CoreError> {
        let notification = self
            .store
            .find_notification(notification_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "notification",
                id: notification_id,
            })?;
        if notification.recipient_id != user_id {
            return Err(CoreError::Forbidden(format!(
                "notification {notification_id} belongs to another user"
            )));
        }
        if !notification.is_read {
            self.store
                .mark_read(notification_id, user_id, Utc::now())
                .await?;
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: DbId) -> Result<u64, CoreError> {
        let marked = self.store.mark_all_read(user_id, Utc::now()).await?;
        tracing::debug!(user_id, marked, "Marked all notifications read");
        Ok(marked)
    }

    pub async fn unread_count(&self, user_id: DbId) -> Result<i64, CoreError> {
        Ok(self.store.unread_notification_count(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use notices_core::lifecycle::NoteStatus;
    use notices_core::notes::NoteType;
    use notices_db::MemoryStore;

    use super::*;

    fn dispatcher(store: Arc<MemoryStore>) -> NotificationDispatcher {
        NotificationDispatcher::new(store, Arc::new(EventBus::default()), 2, Duration::ZERO)
    }

    fn note(status: NoteStatus, version: i64) -> Note {
        let now = Utc::now();
        Note {
            id: 7,
            title: "t".into(),
            body: "b".into(),
            note_type: NoteType::Other,
            author_id: 100,
            department: "tech".into(),
            status,
            current_approver_id: (status == NoteStatus::PendingValidation).then_some(10),
            approval_step: 0,
            recipient_ids: vec![201, 202],
            attachments: Vec::new(),
            scheduled_at: None,
            sent_at: None,
            version,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn submit_notifies_the_first_approver_once() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Arc::clone(&store));
        let pending = note(NoteStatus::PendingValidation, 2);

        let first = dispatcher.on_transition(&pending, NoteAction::Submit).await;
        let again = dispatcher.on_transition(&pending, NoteAction::Submit).await;

        assert_eq!(first.created.len(), 1);
        assert_eq!(first.created[0].recipient_id, 10);
        assert_eq!(first.created[0].kind, NotificationKind::ValidationRequired);
        assert!(again.created.is_empty());
        assert_eq!(again.duplicates, 1);
    }

    #[tokio::test]
    async fn send_notifies_every_recipient() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Arc::clone(&store));

        let outcome = dispatcher
            .on_transition(&note(NoteStatus::Sent, 6), NoteAction::Send)
            .await;

        let recipients: Vec<DbId> = outcome.created.iter().map(|n| n.recipient_id).collect();
        assert_eq!(recipients, vec![201, 202]);
        assert!(outcome
            .created
            .iter()
            .all(|n| n.kind == NotificationKind::NewNote));
    }

    #[tokio::test]
    async fn comment_skips_the_commenter_and_dedupes() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Arc::clone(&store));

        let outcome = dispatcher
            .on_comment_added(&note(NoteStatus::Draft, 1), 300, 55, &[300, 301, 301, 100])
            .await;

        let recipients: Vec<DbId> = outcome.created.iter().map(|n| n.recipient_id).collect();
        assert_eq!(recipients, vec![100, 301]);
    }

    #[tokio::test]
    async fn mark_read_checks_ownership() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Arc::clone(&store));
        let outcome = dispatcher
            .on_transition(&note(NoteStatus::Approved, 5), NoteAction::Approve)
            .await;
        let id = outcome.created[0].id;

        assert!(matches!(
            dispatcher.mark_read(201, id).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            dispatcher.mark_read(100, 9999).await,
            Err(CoreError::NotFound { .. })
        ));
        dispatcher.mark_read(100, id).await.unwrap();
        dispatcher.mark_read(100, id).await.unwrap();
        assert_eq!(dispatcher.unread_count(100).await.unwrap(), 0);
    }
}
