//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`NoteEvent`]s. It is
//! shared via `Arc<EventBus>` between the engine and its subscribers.

use chrono::Utc;
use notices_core::lifecycle::{NoteAction, NoteStatus};
use notices_core::types::{DbId, Timestamp};
use notices_db::models::Notification;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// NoteEvent
// ---------------------------------------------------------------------------

/// An event published by the workflow engine after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteEvent {
    /// A lifecycle transition was committed.
    NoteTransitioned {
        note_id: DbId,
        /// `None` for system actions (SEND).
        actor_id: Option<DbId>,
        action: NoteAction,
        from_status: NoteStatus,
        /// `None` for DELETE.
        to_status: Option<NoteStatus>,
        /// Note version produced by the commit.
        version: i64,
        at: Timestamp,
    },

    /// A note now waits on `approver_id` at chain position `step`.
    ValidationRequired {
        note_id: DbId,
        approver_id: DbId,
        step: i32,
        at: Timestamp,
    },

    /// A collaborator commented on a note.
    CommentAdded {
        note_id: DbId,
        commenter_id: DbId,
        comment_id: DbId,
        at: Timestamp,
    },

    /// A notification row was created for a user.
    NotificationCreated(Notification),
}

impl NoteEvent {
    /// Dot-separated event name, used in logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            NoteEvent::NoteTransitioned { .. } => "note.transitioned",
            NoteEvent::ValidationRequired { .. } => "note.validation_required",
            NoteEvent::CommentAdded { .. } => "note.comment_added",
            NoteEvent::NotificationCreated(_) => "notification.created",
        }
    }

    /// The note the event concerns.
    pub fn note_id(&self) -> DbId {
        match self {
            NoteEvent::NoteTransitioned { note_id, .. }
            | NoteEvent::ValidationRequired { note_id, .. }
            | NoteEvent::CommentAdded { note_id, .. } => *note_id,
            NoteEvent::NotificationCreated(n) => n.related_note_id,
        }
    }

    pub fn comment_added(note_id: DbId, commenter_id: DbId, comment_id: DbId) -> Self {
        NoteEvent::CommentAdded {
            note_id,
            commenter_id,
            comment_id,
            at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`NoteEvent`].
pub struct EventBus {
    sender: broadcast::Sender<NoteEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: NoteEvent) {
        tracing::debug!(
            event_type = event.event_type(),
            note_id = event.note_id(),
            "Publishing event"
        );
        // Ignore the SendError, it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
