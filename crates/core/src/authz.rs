//! Centralized authorization for note operations.
//!
//! Every actor-initiated operation goes through [`authorize`], which first
//! checks that the note's status permits the operation
//! ([`CoreError::InvalidTransition`]) and then that the actor holds the
//! required identity or role ([`CoreError::Forbidden`]).
//!
//! | Operation   | Legal from                    | Allowed actor                  |
//! |-------------|-------------------------------|--------------------------------|
//! | CreateDraft | -                             | author or admin role           |
//! | EditDraft   | DRAFT, RETURNED               | the author                     |
//! | Submit      | DRAFT, RETURNED               | the author                     |
//! | Approve     | PENDING_VALIDATION            | the current approver           |
//! | Return      | PENDING_VALIDATION            | the current approver           |
//! | Schedule    | APPROVED                      | the author or an admin         |
//! | Archive     | any non-ARCHIVED              | admin; author only from SENT   |
//! | Delete      | DRAFT, RETURNED               | the author                     |
//!
//! SEND is performed by the schedule dispatcher and is never authorized for
//! an actor.

use crate::error::CoreError;
use crate::lifecycle::{validate_transition, NoteAction, NoteStatus};
use crate::roles::{Actor, ROLE_ADMIN, ROLE_AUTHOR};
use crate::types::DbId;

/// An operation an actor may request on a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateDraft,
    EditDraft,
    Submit,
    Approve,
    Return,
    Schedule,
    Archive,
    Delete,
}

impl Operation {
    /// The lifecycle action this operation performs, if it is a transition.
    pub fn action(self) -> Option<NoteAction> {
        match self {
            Operation::CreateDraft | Operation::EditDraft => None,
            Operation::Submit => Some(NoteAction::Submit),
            Operation::Approve => Some(NoteAction::Approve),
            Operation::Return => Some(NoteAction::Return),
            Operation::Schedule => Some(NoteAction::Schedule),
            Operation::Archive => Some(NoteAction::Archive),
            Operation::Delete => Some(NoteAction::Delete),
        }
    }
}

/// The note attributes authorization depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteFacts {
    pub status: NoteStatus,
    pub author_id: DbId,
    pub current_approver_id: Option<DbId>,
}

/// Decide whether `actor` may perform `op` on a note described by `facts`.
///
/// `facts` is `None` only for [`Operation::CreateDraft`].
pub fn authorize(op: Operation, actor: &Actor, facts: Option<&NoteFacts>) -> Result<(), CoreError> {
    let Some(facts) = facts else {
        return match op {
            Operation::CreateDraft => authorize_create(actor),
            other => Err(CoreError::Internal(format!(
                "{other:?} requires the target note"
            ))),
        };
    };

    match op.action() {
        Some(action) => validate_transition(facts.status, action)?,
        None if op == Operation::EditDraft && !facts.status.is_editable() => {
            return Err(CoreError::InvalidTransition(format!(
                "note content cannot be edited while the note is {}",
                facts.status
            )));
        }
        None => {}
    }

    let is_author = actor.id == facts.author_id;
    let allowed = match op {
        Operation::CreateDraft => return authorize_create(actor),
        Operation::EditDraft | Operation::Submit | Operation::Delete => is_author,
        Operation::Approve | Operation::Return => facts.current_approver_id == Some(actor.id),
        Operation::Schedule => is_author || actor.is_admin(),
        Operation::Archive => actor.is_admin() || (is_author && facts.status == NoteStatus::Sent),
    };

    if allowed {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "user {} may not perform {op:?} on a {} note",
            actor.id, facts.status
        )))
    }
}

fn authorize_create(actor: &Actor) -> Result<(), CoreError> {
    if actor.has_role(ROLE_AUTHOR) || actor.has_role(ROLE_ADMIN) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "user {} may not draft notes",
            actor.id
        )))
    }
}
