//! Per-recipient read/archive state transitions.
//!
//! A delivery starts UNREAD. Reading sets `read_at` once; archiving keeps
//! `read_at` so that un-archiving returns to READ or UNREAD depending on
//! whether the recipient had read the note before.

use serde::{Deserialize, Serialize};

use crate::types::{define_text_enum, Timestamp};

define_text_enum! {
    /// Read/archive state of a delivered note for one recipient.
    DeliveryState {
        Unread = "UNREAD",
        Read = "READ",
        Archived = "ARCHIVED",
    }
}

/// The mutable part of a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub state: DeliveryState,
    pub read_at: Option<Timestamp>,
    pub archived_at: Option<Timestamp>,
}

impl DeliveryStatus {
    /// Status of a freshly delivered note.
    pub fn unread() -> Self {
        Self {
            state: DeliveryState::Unread,
            read_at: None,
            archived_at: None,
        }
    }

    /// UNREAD -> READ. Returns `None` when nothing changes (already read or
    /// archived).
    pub fn mark_read(&self, now: Timestamp) -> Option<Self> {
        match self.state {
            DeliveryState::Unread => Some(Self {
                state: DeliveryState::Read,
                read_at: Some(now),
                archived_at: None,
            }),
            DeliveryState::Read | DeliveryState::Archived => None,
        }
    }

    /// Move to ARCHIVED, preserving `read_at`. `None` if already archived.
    pub fn archive(&self, now: Timestamp) -> Option<Self> {
        match self.state {
            DeliveryState::Archived => None,
            DeliveryState::Unread | DeliveryState::Read => Some(Self {
                state: DeliveryState::Archived,
                read_at: self.read_at,
                archived_at: Some(now),
            }),
        }
    }

    /// Leave ARCHIVED, back to READ if it had been read, else UNREAD.
    /// `None` if not archived.
    pub fn unarchive(&self) -> Option<Self> {
        match self.state {
            DeliveryState::Archived => Some(Self {
                state: if self.read_at.is_some() {
                    DeliveryState::Read
                } else {
                    DeliveryState::Unread
                },
                read_at: self.read_at,
                archived_at: None,
            }),
            DeliveryState::Unread | DeliveryState::Read => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn unread_becomes_read() {
        let now = Utc::now();
        let read = DeliveryStatus::unread().mark_read(now).unwrap();
        assert_eq!(read.state, DeliveryState::Read);
        assert_eq!(read.read_at, Some(now));
    }

    #[test]
    fn mark_read_twice_is_noop() {
        let first = DeliveryStatus::unread().mark_read(Utc::now()).unwrap();
        assert!(first.mark_read(Utc::now() + Duration::seconds(5)).is_none());
    }

    #[test]
    fn mark_read_on_archived_is_noop() {
        let archived = DeliveryStatus::unread().archive(Utc::now()).unwrap();
        assert!(archived.mark_read(Utc::now()).is_none());
    }

    #[test]
    fn archive_preserves_read_flag() {
        let read_at = Utc::now();
        let read = DeliveryStatus::unread().mark_read(read_at).unwrap();
        let archived = read.archive(read_at + Duration::minutes(1)).unwrap();
        assert_eq!(archived.state, DeliveryState::Archived);
        assert_eq!(archived.read_at, Some(read_at));

        let restored = archived.unarchive().unwrap();
        assert_eq!(restored.state, DeliveryState::Read);
        assert_eq!(restored.read_at, Some(read_at));
        assert!(restored.archived_at.is_none());
    }

    #[test]
    fn unread_archive_returns_to_unread() {
        let archived = DeliveryStatus::unread().archive(Utc::now()).unwrap();
        assert_eq!(archived.unarchive().unwrap().state, DeliveryState::Unread);
    }

    #[test]
    fn archive_twice_and_unarchive_unarchived_are_noops() {
        let archived = DeliveryStatus::unread().archive(Utc::now()).unwrap();
        assert!(archived.archive(Utc::now()).is_none());
        assert!(DeliveryStatus::unread().unarchive().is_none());
    }
}
