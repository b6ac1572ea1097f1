//! Notification kinds, delivery channel names, and the transition routing
//! table used by the notification dispatcher.

use crate::lifecycle::{NoteAction, NoteStatus};
use crate::types::define_text_enum;

define_text_enum! {
    /// What a notification tells its recipient.
    NotificationKind {
        NewNote = "NEW_NOTE",
        ValidationRequired = "VALIDATION_REQUIRED",
        NoteReturned = "NOTE_RETURNED",
        NoteApproved = "NOTE_APPROVED",
        CommentAdded = "COMMENT_ADDED",
        Reminder = "REMINDER",
    }
}

/// Webhook push to an external HTTP endpoint.
pub const CHANNEL_WEBHOOK: &str = "webhook";

/// Email delivered via SMTP.
pub const CHANNEL_EMAIL: &str = "email";

/// Who receives the notification for a routed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The approver the note is now waiting on.
    CurrentApprover,
    /// The note's author.
    Author,
    /// Every recipient of the note.
    Recipients,
}

/// Map a committed transition to the notification it produces.
///
/// An APPROVE that leaves the note in PENDING_VALIDATION (chain advanced)
/// produces nothing here; the follow-up `ValidationRequired` event carries
/// the notification for the next approver.
pub fn route_transition(
    action: NoteAction,
    to_status: Option<NoteStatus>,
) -> Option<(NotificationKind, Audience)> {
    match (action, to_status) {
        (NoteAction::Submit, Some(NoteStatus::PendingValidation)) => {
            Some((NotificationKind::ValidationRequired, Audience::CurrentApprover))
        }
        (NoteAction::Approve, Some(NoteStatus::Approved)) => {
            Some((NotificationKind::NoteApproved, Audience::Author))
        }
        (NoteAction::Return, Some(NoteStatus::Returned)) => {
            Some((NotificationKind::NoteReturned, Audience::Author))
        }
        (NoteAction::Send, Some(NoteStatus::Sent)) => {
            Some((NotificationKind::NewNote, Audience::Recipients))
        }
        _ => None,
    }
}
