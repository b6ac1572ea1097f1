//! Note status values, audit actions, and the lifecycle transition table.
//!
//! ```text
//! DRAFT -> PENDING_VALIDATION -> APPROVED -> SCHEDULED -> SENT -> ARCHIVED
//!                 |    ^
//!                 v    |
//!               RETURNED
//! ```
//!
//! Any non-archived note may additionally be archived (subject to
//! [`authz`](crate::authz)), and DRAFT/RETURNED notes may be deleted.

use crate::error::CoreError;
use crate::types::define_text_enum;

define_text_enum! {
    /// Lifecycle status of a note.
    NoteStatus {
        Draft = "DRAFT",
        PendingValidation = "PENDING_VALIDATION",
        Approved = "APPROVED",
        Returned = "RETURNED",
        Scheduled = "SCHEDULED",
        Sent = "SENT",
        Archived = "ARCHIVED",
    }
}

define_text_enum! {
    /// Action recorded in the audit log for a note.
    ///
    /// `Delete` is only ever written as a tombstone entry.
    NoteAction {
        Submit = "SUBMIT",
        Approve = "APPROVE",
        Return = "RETURN",
        Schedule = "SCHEDULE",
        Send = "SEND",
        Archive = "ARCHIVE",
        Delete = "DELETE",
    }
}

impl NoteStatus {
    /// Terminal states accept no further actions.
    pub fn is_terminal(self) -> bool {
        matches!(self, NoteStatus::Archived)
    }

    /// States in which the author may still edit content.
    pub fn is_editable(self) -> bool {
        matches!(self, NoteStatus::Draft | NoteStatus::Returned)
    }
}

/// Returns the set of actions that may be applied to a note in `from`.
///
/// This is the status half of the legality check; who may perform each
/// action is decided by [`authz::authorize`](crate::authz::authorize).
pub fn allowed_actions(from: NoteStatus) -> &'static [NoteAction] {
    use NoteAction::*;

    match from {
        NoteStatus::Draft => &[Submit, Archive, Delete],
        NoteStatus::PendingValidation => &[Approve, Return, Archive],
        NoteStatus::Approved => &[Schedule, Archive],
        NoteStatus::Returned => &[Submit, Archive, Delete],
        NoteStatus::Scheduled => &[Send, Archive],
        NoteStatus::Sent => &[Archive],
        NoteStatus::Archived => &[],
    }
}

/// Check whether `action` is legal from `from`.
pub fn can_apply(from: NoteStatus, action: NoteAction) -> bool {
    allowed_actions(from).contains(&action)
}

/// Validate a transition, returning [`CoreError::InvalidTransition`] for
/// illegal ones.
pub fn validate_transition(from: NoteStatus, action: NoteAction) -> Result<(), CoreError> {
    if can_apply(from, action) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition(format!(
            "{action} is not allowed while the note is {from}"
        )))
    }
}

/// The status a successful `action` moves the note into.
///
/// `Approve` is reported as [`NoteStatus::Approved`]; the caller keeps the
/// note in `PendingValidation` while further chain levels remain. `Delete`
/// has no target status.
pub fn target_status(action: NoteAction) -> Option<NoteStatus> {
    match action {
        NoteAction::Submit => Some(NoteStatus::PendingValidation),
        NoteAction::Approve => Some(NoteStatus::Approved),
        NoteAction::Return => Some(NoteStatus::Returned),
        NoteAction::Schedule => Some(NoteStatus::Scheduled),
        NoteAction::Send => Some(NoteStatus::Sent),
        NoteAction::Archive => Some(NoteStatus::Archived),
        NoteAction::Delete => None,
    }
}
