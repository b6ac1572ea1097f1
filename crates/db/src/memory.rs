//! Process-local implementation of the storage traits.
//!
//! Mirrors the PostgreSQL semantics that the engine relies on: version
//! checks on note writes, audit clock clamping, idempotent delivery and
//! notification inserts, and cascade of delivery records on note delete.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use notices_core::delivery::DeliveryState;
use notices_core::lifecycle::NoteStatus;
use notices_core::types::{DbId, Timestamp};
use tokio::sync::Mutex;

use crate::models::{
    AuditEntry, CreateAuditEntry, CreateDelivery, CreateNote, CreateNotification, DeliveryRecord,
    Note, Notification,
};
use crate::store::{
    AuditStore, DeliveryStore, NoteStore, NotificationStore, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    notes: BTreeMap<DbId, Note>,
    audit: Vec<AuditEntry>,
    deliveries: BTreeMap<(DbId, DbId), DeliveryRecord>,
    notifications: BTreeMap<DbId, Notification>,
    last_note_id: DbId,
    last_audit_id: DbId,
    last_notification_id: DbId,
}

impl Inner {
    /// Check `expected_version` against the stored note.
    fn guard(&self, id: DbId, expected_version: i64) -> StoreResult<&Note> {
        let note = self
            .notes
            .get(&id)
            .ok_or(StoreError::NotFound { entity: "note", id })?;
        if note.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: "note",
                id,
                expected: expected_version,
            });
        }
        Ok(note)
    }

    fn append_audit(&mut self, input: &CreateAuditEntry) -> AuditEntry {
        let floor = self
            .audit
            .iter()
            .filter(|e| e.note_id == input.note_id)
            .map(|e| e.recorded_at)
            .max()
            .map(|last| last + Duration::microseconds(1));
        let recorded_at = match floor {
            Some(floor) if floor > input.recorded_at => floor,
            _ => input.recorded_at,
        };

        self.last_audit_id += 1;
        let entry = AuditEntry {
            id: self.last_audit_id,
            note_id: input.note_id,
            actor_id: input.actor_id,
            action: input.action,
            from_status: input.from_status,
            to_status: input.to_status,
            comment: input.comment.clone(),
            recorded_at,
        };
        self.audit.push(entry.clone());
        entry
    }
}

/// Storage held in memory behind a single async mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn create_note(&self, input: &CreateNote) -> StoreResult<Note> {
        let mut inner = self.inner.lock().await;
        inner.last_note_id += 1;
        let now = Utc::now();
        let note = Note {
            id: inner.last_note_id,
            title: input.title.clone(),
            body: input.body.clone(),
            note_type: input.note_type,
            author_id: input.author_id,
            department: input.department.clone(),
            status: NoteStatus::Draft,
            current_approver_id: None,
            approval_step: 0,
            recipient_ids: input.recipient_ids.clone(),
            attachments: input.attachments.clone(),
            scheduled_at: None,
            sent_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        inner.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn find_note(&self, id: DbId) -> StoreResult<Option<Note>> {
        Ok(self.inner.lock().await.notes.get(&id).cloned())
    }

    async fn update_content(&self, note: &Note, expected_version: i64) -> StoreResult<Note> {
        let mut inner = self.inner.lock().await;
        let stored = inner.guard(note.id, expected_version)?;
        let updated = Note {
            title: note.title.clone(),
            body: note.body.clone(),
            note_type: note.note_type,
            recipient_ids: note.recipient_ids.clone(),
            attachments: note.attachments.clone(),
            version: stored.version + 1,
            updated_at: Utc::now(),
            ..stored.clone()
        };
        inner.notes.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn commit_transition(
        &self,
        note: &Note,
        expected_version: i64,
        entry: &CreateAuditEntry,
    ) -> StoreResult<(Note, AuditEntry)> {
        let mut inner = self.inner.lock().await;
        let stored = inner.guard(note.id, expected_version)?;
        let updated = Note {
            status: note.status,
            current_approver_id: note.current_approver_id,
            approval_step: note.approval_step,
            scheduled_at: note.scheduled_at,
            sent_at: note.sent_at,
            version: stored.version + 1,
            updated_at: note.updated_at,
            ..stored.clone()
        };
        inner.notes.insert(updated.id, updated.clone());
        let recorded = inner.append_audit(entry);
        Ok((updated, recorded))
    }

    async fn delete_note(
        &self,
        id: DbId,
        expected_version: i64,
        tombstone: &CreateAuditEntry,
    ) -> StoreResult<AuditEntry> {
        let mut inner = self.inner.lock().await;
        inner.guard(id, expected_version)?;
        inner.notes.remove(&id);
        inner.deliveries.retain(|(note_id, _), _| *note_id != id);
        Ok(inner.append_audit(tombstone))
    }

    async fn list_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Note> = inner
            .notes
            .values()
            .filter(|n| n.status == NoteStatus::Scheduled)
            .filter(|n| n.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|n| (n.scheduled_at, n.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn list_pending_for(&self, approver_id: DbId) -> StoreResult<Vec<Note>> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<Note> = inner
            .notes
            .values()
            .filter(|n| n.status == NoteStatus::PendingValidation)
            .filter(|n| n.current_approver_id == Some(approver_id))
            .cloned()
            .collect();
        pending.sort_by_key(|n| (n.updated_at, n.id));
        Ok(pending)
    }

    async fn list_pending_since(&self, before: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        let inner = self.inner.lock().await;
        let mut stale: Vec<Note> = inner
            .notes
            .values()
            .filter(|n| n.status == NoteStatus::PendingValidation && n.updated_at <= before)
            .cloned()
            .collect();
        stale.sort_by_key(|n| (n.updated_at, n.id));
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Note>> {
        let inner = self.inner.lock().await;
        let mut missing: Vec<Note> = inner
            .notes
            .values()
            .filter(|n| n.status == NoteStatus::Sent)
            .filter(|n| {
                n.recipient_ids
                    .iter()
                    .any(|r| !inner.deliveries.contains_key(&(n.id, *r)))
            })
            .cloned()
            .collect();
        missing.sort_by_key(|n| (n.sent_at, n.id));
        missing.truncate(limit.max(0) as usize);
        Ok(missing)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn history(&self, note_id: DbId) -> StoreResult<Vec<AuditEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<AuditEntry> = inner
            .audit
            .iter()
            .filter(|e| e.note_id == note_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.recorded_at, e.id));
        Ok(entries)
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn create_delivery(&self, input: &CreateDelivery) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.notes.contains_key(&input.note_id) {
            return Err(StoreError::NotFound {
                entity: "note",
                id: input.note_id,
            });
        }
        let key = (input.note_id, input.recipient_id);
        if inner.deliveries.contains_key(&key) {
            return Ok(false);
        }
        inner.deliveries.insert(
            key,
            DeliveryRecord {
                note_id: input.note_id,
                recipient_id: input.recipient_id,
                state: DeliveryState::Unread,
                delivered_at: input.delivered_at,
                read_at: None,
                archived_at: None,
            },
        );
        Ok(true)
    }

    async fn find_delivery(
        &self,
        note_id: DbId,
        recipient_id: DbId,
    ) -> StoreResult<Option<DeliveryRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.deliveries.get(&(note_id, recipient_id)).cloned())
    }

    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryState,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner
            .deliveries
            .get_mut(&(record.note_id, record.recipient_id))
        {
            Some(stored) if stored.state == expected => {
                stored.state = record.state;
                stored.read_at = record.read_at;
                stored.archived_at = record.archived_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_recipient(
        &self,
        recipient_id: DbId,
        state: Option<DeliveryState>,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        let inner = self.inner.lock().await;
        let mut records: Vec<DeliveryRecord> = inner
            .deliveries
            .values()
            .filter(|d| d.recipient_id == recipient_id)
            .filter(|d| state.map_or(true, |s| d.state == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.delivered_at
                .cmp(&a.delivered_at)
                .then(b.note_id.cmp(&a.note_id))
        });
        Ok(records)
    }

    async fn list_for_note(&self, note_id: DbId) -> StoreResult<Vec<DeliveryRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .deliveries
            .values()
            .filter(|d| d.note_id == note_id)
            .cloned()
            .collect())
    }

    async fn unread_delivery_count(&self, recipient_id: DbId) -> StoreResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .deliveries
            .values()
            .filter(|d| d.recipient_id == recipient_id && d.state == DeliveryState::Unread)
            .count() as i64)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> StoreResult<Option<Notification>> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner.notifications.values().any(|n| {
            n.recipient_id == input.recipient_id
                && n.related_note_id == input.related_note_id
                && n.kind == input.kind
                && n.trigger_key == input.trigger_key
        });
        if duplicate {
            return Ok(None);
        }

        inner.last_notification_id += 1;
        let notification = Notification {
            id: inner.last_notification_id,
            recipient_id: input.recipient_id,
            kind: input.kind,
            related_note_id: input.related_note_id,
            trigger_key: input.trigger_key.clone(),
            is_read: false,
            created_at: input.created_at,
            read_at: None,
        };
        inner
            .notifications
            .insert(notification.id, notification.clone());
        Ok(Some(notification))
    }

    async fn find_notification(&self, id: DbId) -> StoreResult<Option<Notification>> {
        Ok(self.inner.lock().await.notifications.get(&id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        let inner = self.inner.lock().await;
        let mut list: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.recipient_id == user_id && !(unread_only && n.is_read))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_read(&self, id: DbId, user_id: DbId, at: Timestamp) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.notifications.get_mut(&id) {
            Some(n) if n.recipient_id == user_id && !n.is_read => {
                n.is_read = true;
                n.read_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: DbId, at: Timestamp) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut marked = 0;
        for n in inner
            .notifications
            .values_mut()
            .filter(|n| n.recipient_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(at);
            marked += 1;
        }
        Ok(marked)
    }

    async fn unread_notification_count(&self, user_id: DbId) -> StoreResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .values()
            .filter(|n| n.recipient_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn delete_read_before(&self, cutoff: Timestamp) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.notifications.len();
        inner
            .notifications
            .retain(|_, n| !(n.is_read && n.read_at.is_some_and(|at| at < cutoff)));
        Ok((before - inner.notifications.len()) as u64)
    }
}
