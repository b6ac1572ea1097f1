//! The note state machine.
//!
//! [`NoteWorkflow`] is the only writer of note lifecycle state. Each
//! operation runs under the note's lock, checks the centralized
//! authorization predicate, and commits the new state together with its
//! audit entry in one version-guarded store call. Notifications and bus
//! events are emitted only after that commit succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use notices_core::authz::{authorize, Operation};
use notices_core::error::CoreError;
use notices_core::hierarchy::{resolve, Directory};
use notices_core::lifecycle::{validate_transition, NoteAction, NoteStatus};
use notices_core::notes::{
    normalize_recipients, validate_attachments, validate_body, validate_recipients,
    validate_return_comment, validate_title, AttachmentRef, NoteType,
};
use notices_core::roles::Actor;
use notices_core::types::{DbId, Timestamp};
use notices_db::models::{CreateAuditEntry, CreateNote, Note, UpdateNote};
use notices_db::{AuditStore, NoteStore};
use notices_events::{EventBus, NoteEvent};

use crate::locks::NoteLocks;
use crate::notifier::{FanOut, NotificationDispatcher};

/// Content of a new draft. The author is the acting user.
#[derive(Debug, Clone)]
pub struct NewDraft {
    pub title: String,
    pub body: String,
    pub note_type: NoteType,
    pub department: String,
    pub recipient_ids: Vec<DbId>,
    pub attachments: Vec<AttachmentRef>,
}

pub struct NoteWorkflow {
    notes: Arc<dyn NoteStore>,
    audit: Arc<dyn AuditStore>,
    directory: Arc<dyn Directory>,
    locks: Arc<NoteLocks>,
    notifier: Arc<NotificationDispatcher>,
    bus: Arc<EventBus>,
}

impl NoteWorkflow {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        audit: Arc<dyn AuditStore>,
        directory: Arc<dyn Directory>,
        locks: Arc<NoteLocks>,
        notifier: Arc<NotificationDispatcher>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            notes,
            audit,
            directory,
            locks,
            notifier,
            bus,
        }
    }

    // -----------------------------------------------------------------------
    // Drafting
    // -----------------------------------------------------------------------

    /// Create a DRAFT note authored by `actor`.
    pub async fn create_draft(&self, actor: &Actor, draft: NewDraft) -> Result<Note, CoreError> {
        authorize(Operation::CreateDraft, actor, None)?;
        validate_title(&draft.title)?;
        validate_body(&draft.body)?;
        validate_attachments(&draft.attachments)?;
        let department = draft.department.trim();
        if department.is_empty() {
            return Err(CoreError::Validation(
                "Note department must not be empty".to_string(),
            ));
        }

        let input = CreateNote {
            title: draft.title.trim().to_string(),
            body: draft.body,
            note_type: draft.note_type,
            author_id: actor.id,
            department: department.to_string(),
            recipient_ids: normalize_recipients(draft.recipient_ids),
            attachments: draft.attachments,
        };
        let note = self.notes.create_note(&input).await?;
        tracing::info!(note_id = note.id, actor_id = actor.id, "Draft created");
        Ok(note)
    }

    /// Edit the content of a DRAFT or RETURNED note. Not a lifecycle
    /// transition, so nothing is audited or notified.
    pub async fn update_draft(
        &self,
        note_id: DbId,
        actor: &Actor,
        edit: UpdateNote,
    ) -> Result<Note, CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        authorize(Operation::EditDraft, actor, Some(&note.facts()))?;

        let mut edited = note.clone();
        if let Some(title) = edit.title {
            validate_title(&title)?;
            edited.title = title.trim().to_string();
        }
        if let Some(body) = edit.body {
            validate_body(&body)?;
            edited.body = body;
        }
        if let Some(note_type) = edit.note_type {
            edited.note_type = note_type;
        }
        if let Some(recipient_ids) = edit.recipient_ids {
            edited.recipient_ids = normalize_recipients(recipient_ids);
        }
        if let Some(attachments) = edit.attachments {
            validate_attachments(&attachments)?;
            edited.attachments = attachments;
        }

        let updated = self.notes.update_content(&edited, note.version).await?;
        tracing::debug!(note_id, actor_id = actor.id, version = updated.version, "Draft edited");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// DRAFT/RETURNED -> PENDING_VALIDATION, waiting on the first level of
    /// the validation chain.
    pub async fn submit(&self, note_id: DbId, actor: &Actor) -> Result<Note, CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        authorize(Operation::Submit, actor, Some(&note.facts()))?;
        validate_title(&note.title)?;
        validate_body(&note.body)?;
        validate_recipients(&note.recipient_ids)?;

        let chain = resolve(&note.department, self.directory.as_ref())?;
        let first = chain.approver_at(0).ok_or_else(|| {
            CoreError::EmptyChain(format!("no approver for department '{}'", note.department))
        })?;

        let next = Note {
            status: NoteStatus::PendingValidation,
            current_approver_id: Some(first),
            approval_step: 0,
            updated_at: Utc::now(),
            ..note.clone()
        };
        let committed = self
            .commit(&note, next, NoteAction::Submit, Some(actor.id), None)
            .await?;

        self.notifier
            .on_transition(&committed, NoteAction::Submit)
            .await;
        self.publish_validation_required(&committed);
        self.publish_transition(&note, &committed, NoteAction::Submit, Some(actor.id));
        Ok(committed)
    }

    /// Approve at the current level. Advances to the next level of the
    /// recomputed chain, or moves the note to APPROVED after the last one.
    ///
    /// The next level is the first one after the actor's position that has
    /// not approved in this round. An actor no longer in the chain (the
    /// directory changed while the note waited) hands over to the first
    /// level that has not approved yet, so no remaining level is skipped.
    pub async fn approve(&self, note_id: DbId, actor: &Actor) -> Result<Note, CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        if let Err(err) = authorize(Operation::Approve, actor, Some(&note.facts())) {
            return Err(self.stale_or(err, &note, actor));
        }

        let chain = resolve(&note.department, self.directory.as_ref())?;
        let approved = self.approved_this_round(note_id).await?;
        let from_step = chain.position_of(actor.id).map_or(0, |position| position + 1);
        let next_level = chain
            .levels()
            .iter()
            .enumerate()
            .skip(from_step)
            .find(|(_, level)| {
                level.approver_id != actor.id && !approved.contains(&level.approver_id)
            });

        let now = Utc::now();
        let next = match next_level {
            Some((step, level)) => Note {
                current_approver_id: Some(level.approver_id),
                approval_step: step as i32,
                updated_at: now,
                ..note.clone()
            },
            None => Note {
                status: NoteStatus::Approved,
                current_approver_id: None,
                updated_at: now,
                ..note.clone()
            },
        };
        let committed = self
            .commit(&note, next, NoteAction::Approve, Some(actor.id), None)
            .await?;

        if committed.status == NoteStatus::PendingValidation {
            self.notifier.on_validation_required(&committed).await;
            self.publish_validation_required(&committed);
        } else {
            self.notifier
                .on_transition(&committed, NoteAction::Approve)
                .await;
        }
        self.publish_transition(&note, &committed, NoteAction::Approve, Some(actor.id));
        Ok(committed)
    }

    /// Send the note back to its author with a mandatory comment.
    ///
    /// Does not consult the directory, so the current approver can still
    /// return a note whose chain no longer resolves. The author then
    /// resubmits once the hierarchy is fixed, or an admin archives the note.
    pub async fn return_note(
        &self,
        note_id: DbId,
        actor: &Actor,
        comment: &str,
    ) -> Result<Note, CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        if let Err(err) = authorize(Operation::Return, actor, Some(&note.facts())) {
            return Err(self.stale_or(err, &note, actor));
        }
        validate_return_comment(comment)?;

        let next = Note {
            status: NoteStatus::Returned,
            current_approver_id: None,
            approval_step: 0,
            updated_at: Utc::now(),
            ..note.clone()
        };
        let committed = self
            .commit(
                &note,
                next,
                NoteAction::Return,
                Some(actor.id),
                Some(comment.trim().to_string()),
            )
            .await?;

        self.notifier
            .on_transition(&committed, NoteAction::Return)
            .await;
        self.publish_transition(&note, &committed, NoteAction::Return, Some(actor.id));
        Ok(committed)
    }

    /// APPROVED -> SCHEDULED for dispatch at `scheduled_at`, which must lie
    /// in the future.
    pub async fn schedule(
        &self,
        note_id: DbId,
        actor: &Actor,
        scheduled_at: Timestamp,
    ) -> Result<Note, CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        authorize(Operation::Schedule, actor, Some(&note.facts()))?;

        let now = Utc::now();
        if scheduled_at <= now {
            return Err(CoreError::Validation(format!(
                "Scheduled time {scheduled_at} is not in the future"
            )));
        }

        let next = Note {
            status: NoteStatus::Scheduled,
            scheduled_at: Some(scheduled_at),
            updated_at: now,
            ..note.clone()
        };
        let committed = self
            .commit(&note, next, NoteAction::Schedule, Some(actor.id), None)
            .await?;

        self.publish_transition(&note, &committed, NoteAction::Schedule, Some(actor.id));
        Ok(committed)
    }

    /// SCHEDULED -> SENT. Invoked only by the schedule dispatcher, which
    /// must hold the note lock.
    pub(crate) async fn mark_sent(&self, note_id: DbId, now: Timestamp) -> Result<Note, CoreError> {
        let note = self.load(note_id).await?;
        validate_transition(note.status, NoteAction::Send)?;
        if note.scheduled_at.is_some_and(|at| at > now) {
            return Err(CoreError::InvalidTransition(format!(
                "note {note_id} is not due yet"
            )));
        }

        let next = Note {
            status: NoteStatus::Sent,
            sent_at: Some(now),
            updated_at: now,
            ..note.clone()
        };
        let committed = self
            .commit(&note, next, NoteAction::Send, None, None)
            .await?;

        self.publish_transition(&note, &committed, NoteAction::Send, None);
        Ok(committed)
    }

    /// Move a note to ARCHIVED.
    pub async fn archive(&self, note_id: DbId, actor: &Actor) -> Result<Note, CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        authorize(Operation::Archive, actor, Some(&note.facts()))?;

        let next = Note {
            status: NoteStatus::Archived,
            current_approver_id: None,
            updated_at: Utc::now(),
            ..note.clone()
        };
        let committed = self
            .commit(&note, next, NoteAction::Archive, Some(actor.id), None)
            .await?;

        self.publish_transition(&note, &committed, NoteAction::Archive, Some(actor.id));
        Ok(committed)
    }

    /// Remove a DRAFT or RETURNED note, leaving a DELETE tombstone in the
    /// audit log.
    pub async fn delete(&self, note_id: DbId, actor: &Actor) -> Result<(), CoreError> {
        let _guard = self.locks.acquire(note_id).await?;
        let note = self.load(note_id).await?;
        authorize(Operation::Delete, actor, Some(&note.facts()))?;

        let tombstone = CreateAuditEntry {
            note_id,
            actor_id: Some(actor.id),
            action: NoteAction::Delete,
            from_status: note.status,
            to_status: None,
            comment: None,
            recorded_at: Utc::now(),
        };
        let entry = self
            .notes
            .delete_note(note_id, note.version, &tombstone)
            .await?;

        tracing::info!(note_id, actor_id = actor.id, from = %note.status, "Note deleted");
        self.bus.publish(NoteEvent::NoteTransitioned {
            note_id,
            actor_id: Some(actor.id),
            action: NoteAction::Delete,
            from_status: note.status,
            to_status: None,
            version: note.version,
            at: entry.recorded_at,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries and hooks
    // -----------------------------------------------------------------------

    pub async fn get(&self, note_id: DbId) -> Result<Note, CoreError> {
        self.load(note_id).await
    }

    /// Notes currently waiting on `approver_id`, oldest first.
    pub async fn validation_inbox(&self, approver_id: DbId) -> Result<Vec<Note>, CoreError> {
        Ok(self.notes.list_pending_for(approver_id).await?)
    }

    /// A collaborator posted comment `comment_id` on the note. Notifies the
    /// author and `prior_commenter_ids`, never the commenter.
    pub async fn comment_added(
        &self,
        note_id: DbId,
        commenter_id: DbId,
        comment_id: DbId,
        prior_commenter_ids: &[DbId],
    ) -> Result<FanOut, CoreError> {
        let note = self.load(note_id).await?;
        self.bus
            .publish(NoteEvent::comment_added(note_id, commenter_id, comment_id));
        Ok(self
            .notifier
            .on_comment_added(&note, commenter_id, comment_id, prior_commenter_ids)
            .await)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load(&self, note_id: DbId) -> Result<Note, CoreError> {
        self.notes.find_note(note_id).await?.ok_or(CoreError::NotFound {
            entity: "note",
            id: note_id,
        })
    }

    /// Users who approved the note since its latest submission.
    async fn approved_this_round(&self, note_id: DbId) -> Result<HashSet<DbId>, CoreError> {
        let history = self.audit.history(note_id).await?;
        let round_start = history
            .iter()
            .rposition(|e| e.action == NoteAction::Submit)
            .map_or(0, |i| i + 1);
        Ok(history[round_start..]
            .iter()
            .filter(|e| e.action == NoteAction::Approve)
            .filter_map(|e| e.actor_id)
            .collect())
    }

    /// Persist `after` and its audit entry, guarded by `before.version`.
    async fn commit(
        &self,
        before: &Note,
        after: Note,
        action: NoteAction,
        actor_id: Option<DbId>,
        comment: Option<String>,
    ) -> Result<Note, CoreError> {
        let entry = CreateAuditEntry {
            note_id: before.id,
            actor_id,
            action,
            from_status: before.status,
            to_status: Some(after.status),
            comment,
            recorded_at: after.updated_at,
        };
        let (committed, _) = self
            .notes
            .commit_transition(&after, before.version, &entry)
            .await
            .map_err(|e| {
                tracing::warn!(
                    note_id = before.id,
                    action = %action,
                    error = %e,
                    "Note transition rejected by store"
                );
                CoreError::from(e)
            })?;

        tracing::info!(
            note_id = committed.id,
            actor_id,
            action = %action,
            from = %before.status,
            to = %committed.status,
            version = committed.version,
            "Note transition committed"
        );
        Ok(committed)
    }

    /// An approver from an earlier level of the current round acting again
    /// gets `Conflict` instead of `Forbidden`.
    fn stale_or(&self, err: CoreError, note: &Note, actor: &Actor) -> CoreError {
        if !matches!(err, CoreError::Forbidden(_)) || note.status != NoteStatus::PendingValidation {
            return err;
        }
        let Ok(chain) = resolve(&note.department, self.directory.as_ref()) else {
            return err;
        };
        match chain.position_of(actor.id) {
            Some(position) if (position as i32) < note.approval_step => {
                CoreError::Conflict(format!(
                    "note {} already moved past user {}'s validation level",
                    note.id, actor.id
                ))
            }
            _ => err,
        }
    }

    fn publish_transition(
        &self,
        before: &Note,
        after: &Note,
        action: NoteAction,
        actor_id: Option<DbId>,
    ) {
        self.bus.publish(NoteEvent::NoteTransitioned {
            note_id: after.id,
            actor_id,
            action,
            from_status: before.status,
            to_status: Some(after.status),
            version: after.version,
            at: after.updated_at,
        });
    }

    fn publish_validation_required(&self, note: &Note) {
        if let Some(approver_id) = note.current_approver_id {
            self.bus.publish(NoteEvent::ValidationRequired {
                note_id: note.id,
                approver_id,
                step: note.approval_step,
                at: note.updated_at,
            });
        }
    }
}
