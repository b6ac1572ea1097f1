//! Note content vocabulary and validation functions.
//!
//! Defines note types, attachment references, and the content checks applied
//! when a draft is created or edited and when it leaves DRAFT.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{define_text_enum, DbId};

/* --------------------------------------------------------------------------
Constants
-------------------------------------------------------------------------- */

/// Maximum length of a note title, in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of a note body, in characters.
pub const MAX_BODY_LENGTH: usize = 50_000;

/// Maximum number of attachments per note.
pub const MAX_ATTACHMENTS: usize = 20;

/// Maximum length of a return comment.
pub const MAX_COMMENT_LENGTH: usize = 2_000;

define_text_enum! {
    /// Kind of internal notice.
    NoteType {
        Convocation = "CONVOCATION",
        Report = "REPORT",
        Announcement = "ANNOUNCEMENT",
        Other = "OTHER",
    }
}

/// Opaque reference to a blob held by the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub blob_id: String,
    pub size_bytes: i64,
    pub content_type: String,
}

/* --------------------------------------------------------------------------
Validation functions
-------------------------------------------------------------------------- */

/// Validate a title: non-blank and within [`MAX_TITLE_LENGTH`].
pub fn validate_title(title: &str) -> Result<(), CoreError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Note title must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Note title exceeds maximum length of {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a body: non-blank and within [`MAX_BODY_LENGTH`].
pub fn validate_body(body: &str) -> Result<(), CoreError> {
    if body.trim().is_empty() {
        return Err(CoreError::Validation("Note body must not be empty".to_string()));
    }
    if body.chars().count() > MAX_BODY_LENGTH {
        return Err(CoreError::Validation(format!(
            "Note body exceeds maximum length of {MAX_BODY_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate the attachment list.
pub fn validate_attachments(attachments: &[AttachmentRef]) -> Result<(), CoreError> {
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(CoreError::Validation(format!(
            "A note may carry at most {MAX_ATTACHMENTS} attachments"
        )));
    }
    for attachment in attachments {
        if attachment.blob_id.trim().is_empty() {
            return Err(CoreError::Validation("Attachment blob id must not be empty".to_string()));
        }
        if attachment.size_bytes <= 0 {
            return Err(CoreError::Validation(format!(
                "Attachment '{}' has invalid size {}",
                attachment.blob_id, attachment.size_bytes
            )));
        }
        if attachment.content_type.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Attachment '{}' has no content type",
                attachment.blob_id
            )));
        }
    }
    Ok(())
}

/// Validate that a note has at least one recipient.
pub fn validate_recipients(recipient_ids: &[DbId]) -> Result<(), CoreError> {
    if recipient_ids.is_empty() {
        return Err(CoreError::Validation(
            "A note must have at least one recipient before it is submitted".to_string(),
        ));
    }
    Ok(())
}

/// Validate a return comment: mandatory and bounded.
pub fn validate_return_comment(comment: &str) -> Result<(), CoreError> {
    if comment.trim().is_empty() {
        return Err(CoreError::Validation(
            "A comment is required when returning a note".to_string(),
        ));
    }
    if comment.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Comment exceeds maximum length of {MAX_COMMENT_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Deduplicate and sort recipient ids.
pub fn normalize_recipients(recipient_ids: impl IntoIterator<Item = DbId>) -> Vec<DbId> {
    recipient_ids
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */
