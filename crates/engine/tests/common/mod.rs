//! Shared fixtures for engine integration tests.
//!
//! Cast: author A (100) in department `tech`, department head H (10),
//! executive director E (1), recipients R1 (201) and R2 (202).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use notices_core::delivery::DeliveryState;
use notices_core::hierarchy::{Directory, StaticDirectory};
use notices_core::notes::NoteType;
use notices_core::roles::{
    Actor, ROLE_ADMIN, ROLE_AUTHOR, ROLE_DEPARTMENT_HEAD, ROLE_EXECUTIVE_DIRECTOR, ROLE_STAFF,
};
use notices_core::types::{DbId, Timestamp};
use notices_db::models::{
    AuditEntry, CreateAuditEntry, CreateDelivery, CreateNote, CreateNotification, DeliveryRecord,
    Note, Notification,
};
use notices_db::{
    AuditStore, DeliveryStore, MemoryStore, NoteStore, NotificationStore, StoreError, StoreResult,
};
use notices_engine::{Engine, EngineConfig, NewDraft, Stores};
use notices_events::{EventBus, NoteEvent};
use tokio::sync::broadcast;

pub const AUTHOR: DbId = 100;
pub const HEAD: DbId = 10;
pub const DIRECTOR: DbId = 1;
pub const R1: DbId = 201;
pub const R2: DbId = 202;
pub const ADMIN: DbId = 900;
pub const STRANGER: DbId = 300;

pub fn author() -> Actor {
    Actor::new(AUTHOR, [ROLE_AUTHOR])
}

pub fn head() -> Actor {
    Actor::new(HEAD, [ROLE_DEPARTMENT_HEAD])
}

pub fn director() -> Actor {
    Actor::new(DIRECTOR, [ROLE_EXECUTIVE_DIRECTOR])
}

pub fn admin() -> Actor {
    Actor::new(ADMIN, [ROLE_ADMIN])
}

pub fn stranger() -> Actor {
    Actor::new(STRANGER, [ROLE_STAFF])
}

pub fn recipient(id: DbId) -> Actor {
    Actor::new(id, [ROLE_STAFF])
}

pub fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_department_head("tech", HEAD)
        .with_executive_director(DIRECTOR)
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        lock_timeout: Duration::from_millis(200),
        delivery_retry_delay: Duration::ZERO,
        notify_retry_delay: Duration::ZERO,
        ..EngineConfig::default()
    }
}

pub fn draft() -> NewDraft {
    NewDraft {
        title: "All-hands meeting".to_string(),
        body: "Friday at 10:00 in the main hall.".to_string(),
        note_type: NoteType::Convocation,
        department: "tech".to_string(),
        recipient_ids: vec![R2, R1, R1],
        attachments: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Directory that can be reconfigured mid-test
// ---------------------------------------------------------------------------

pub struct SwitchableDirectory {
    current: Mutex<StaticDirectory>,
}

impl SwitchableDirectory {
    pub fn new(directory: StaticDirectory) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(directory),
        })
    }

    pub fn set(&self, directory: StaticDirectory) {
        *self.current.lock().unwrap() = directory;
    }
}

impl Directory for SwitchableDirectory {
    fn department_head(&self, department: &str) -> Option<DbId> {
        self.current.lock().unwrap().department_head(department)
    }

    fn executive_director(&self) -> Option<DbId> {
        self.current.lock().unwrap().executive_director()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub events: broadcast::Receiver<NoteEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_directory(directory())
    }

    pub fn with_directory(directory: StaticDirectory) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::over(Arc::clone(&store), Stores::shared(store), directory, test_config())
    }

    pub fn over(
        store: Arc<MemoryStore>,
        stores: Stores,
        directory: StaticDirectory,
        config: EngineConfig,
    ) -> Self {
        Self::over_directory(store, stores, Arc::new(directory), config)
    }

    /// A harness whose directory the test keeps a handle on.
    pub fn with_switchable(directory: Arc<SwitchableDirectory>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::over_directory(Arc::clone(&store), Stores::shared(store), directory, test_config())
    }

    pub fn over_directory(
        store: Arc<MemoryStore>,
        stores: Stores,
        directory: Arc<dyn Directory>,
        config: EngineConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();
        let engine = Engine::new(stores, directory, bus, config);
        Self {
            engine,
            store,
            events,
        }
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn new_draft(&self) -> Note {
        self.engine
            .workflow
            .create_draft(&author(), draft())
            .await
            .unwrap()
    }

    /// A note approved by H then E.
    pub async fn approved_note(&self) -> Note {
        let note = self.new_draft().await;
        let wf = &self.engine.workflow;
        wf.submit(note.id, &author()).await.unwrap();
        wf.approve(note.id, &head()).await.unwrap();
        wf.approve(note.id, &director()).await.unwrap()
    }

    /// An approved note scheduled one second from now. Returns the note and
    /// a time at which it is due.
    pub async fn scheduled_note(&self) -> (Note, Timestamp) {
        let note = self.approved_note().await;
        let at = Utc::now() + chrono::Duration::seconds(1);
        let scheduled = self
            .engine
            .workflow
            .schedule(note.id, &author(), at)
            .await
            .unwrap();
        (scheduled, at + chrono::Duration::seconds(1))
    }

    pub async fn notifications_for(&self, user_id: DbId) -> Vec<Notification> {
        self.store.list_for_user(user_id, false, 100, 0).await.unwrap()
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryStore`] and fails selected calls on demand.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    fail_commits: AtomicBool,
    commit_delay: Mutex<Option<Duration>>,
    /// Remaining injected failures of `create_delivery`, per recipient.
    delivery_failures: Mutex<HashMap<DbId, u32>>,
    /// Remaining injected failures of `create_notification`, per recipient.
    notification_failures: Mutex<HashMap<DbId, u32>>,
    delivery_calls: Mutex<HashMap<DbId, u32>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(false),
            commit_delay: Mutex::new(None),
            delivery_failures: Mutex::new(HashMap::new()),
            notification_failures: Mutex::new(HashMap::new()),
            delivery_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn delay_commits(&self, delay: Duration) {
        *self.commit_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_deliveries_for(&self, recipient_id: DbId, times: u32) {
        self.delivery_failures
            .lock()
            .unwrap()
            .insert(recipient_id, times);
    }

    pub fn fail_notifications_for(&self, recipient_id: DbId, times: u32) {
        self.notification_failures
            .lock()
            .unwrap()
            .insert(recipient_id, times);
    }

    pub fn delivery_calls_for(&self, recipient_id: DbId) -> u32 {
        self.delivery_calls
            .lock()
            .unwrap()
            .get(&recipient_id)
            .copied()
            .unwrap_or(0)
    }

    fn take_failure(map: &Mutex<HashMap<DbId, u32>>, recipient_id: DbId) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(&recipient_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    async fn before_commit(&self) -> StoreResult<()> {
        let delay = *self.commit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteStore for FaultyStore {
    async fn create_note(&self, input: &CreateNote) -> StoreResult<Note> {
        self.inner.create_note(input).await
    }

    async fn find_note(&self, id: DbId) -> StoreResult<Option<Note>> {
        self.inner.find_note(id).await
    }

    async fn update_content(&self, note: &Note, expected_version: i64) -> StoreResult<Note> {
        self.before_commit().await?;
        self.inner.update_content(note, expected_version).await
    }

    async fn commit_transition(
        &self,
        note: &Note,
        expected_version: i64,
        entry: &CreateAuditEntry,
    ) -> StoreResult<(Note, AuditEntry)> {
        self.before_commit().await?;
        self.inner
            .commit_transition(note, expected_version, entry)
            .await
    }

    async fn delete_note(
        &self,
        id: DbId,
        expected_version: i64,
        tombstone: &CreateAuditEntry,
    ) -> StoreResult<AuditEntry> {
        self.before_commit().await?;
        self.inner.delete_note(id, expected_version, tombstone).await
    }

    async fn list_due(&self, now: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        self.inner.list_due(now, limit).await
    }

    async fn list_pending_for(&self, approver_id: DbId) -> StoreResult<Vec<Note>> {
        self.inner.list_pending_for(approver_id).await
    }

    async fn list_pending_since(&self, before: Timestamp, limit: i64) -> StoreResult<Vec<Note>> {
        self.inner.list_pending_since(before, limit).await
    }

    async fn list_undelivered(&self, limit: i64) -> StoreResult<Vec<Note>> {
        self.inner.list_undelivered(limit).await
    }
}

#[async_trait]
impl AuditStore for FaultyStore {
    async fn history(&self, note_id: DbId) -> StoreResult<Vec<AuditEntry>> {
        self.inner.history(note_id).await
    }
}

#[async_trait]
impl DeliveryStore for FaultyStore {
    async fn create_delivery(&self, input: &CreateDelivery) -> StoreResult<bool> {
        *self
            .delivery_calls
            .lock()
            .unwrap()
            .entry(input.recipient_id)
            .or_default() += 1;
        if Self::take_failure(&self.delivery_failures, input.recipient_id) {
            return Err(StoreError::Unavailable("injected delivery failure".into()));
        }
        self.inner.create_delivery(input).await
    }

    async fn find_delivery(
        &self,
        note_id: DbId,
        recipient_id: DbId,
    ) -> StoreResult<Option<DeliveryRecord>> {
        self.inner.find_delivery(note_id, recipient_id).await
    }

    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryState,
    ) -> StoreResult<bool> {
        self.inner.update_delivery(record, expected).await
    }

    async fn list_for_recipient(
        &self,
        recipient_id: DbId,
        state: Option<DeliveryState>,
    ) -> StoreResult<Vec<DeliveryRecord>> {
        self.inner.list_for_recipient(recipient_id, state).await
    }

    async fn list_for_note(&self, note_id: DbId) -> StoreResult<Vec<DeliveryRecord>> {
        self.inner.list_for_note(note_id).await
    }

    async fn unread_delivery_count(&self, recipient_id: DbId) -> StoreResult<i64> {
        self.inner.unread_delivery_count(recipient_id).await
    }
}

#[async_trait]
impl NotificationStore for FaultyStore {
    async fn create_notification(
        &self,
        input: &CreateNotification,
    ) -> StoreResult<Option<Notification>> {
        if Self::take_failure(&self.notification_failures, input.recipient_id) {
            return Err(StoreError::Unavailable(
                "injected notification failure".into(),
            ));
        }
        self.inner.create_notification(input).await
    }

    async fn find_notification(&self, id: DbId) -> StoreResult<Option<Notification>> {
        self.inner.find_notification(id).await
    }

    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        self.inner
            .list_for_user(user_id, unread_only, limit, offset)
            .await
    }

    async fn mark_read(&self, id: DbId, user_id: DbId, at: Timestamp) -> StoreResult<bool> {
        self.inner.mark_read(id, user_id, at).await
    }

    async fn mark_all_read(&self, user_id: DbId, at: Timestamp) -> StoreResult<u64> {
        self.inner.mark_all_read(user_id, at).await
    }

    async fn unread_notification_count(&self, user_id: DbId) -> StoreResult<i64> {
        self.inner.unread_notification_count(user_id).await
    }

    async fn delete_read_before(&self, cutoff: Timestamp) -> StoreResult<u64> {
        self.inner.delete_read_before(cutoff).await
    }
}

/// A harness whose engine runs on a [`FaultyStore`].
pub fn faulty_harness(config: EngineConfig) -> (Harness, Arc<FaultyStore>) {
    let store = Arc::new(MemoryStore::new());
    let faulty = Arc::new(FaultyStore::new(Arc::clone(&store)));
    let harness = Harness::over(
        store,
        Stores::shared(Arc::clone(&faulty)),
        directory(),
        config,
    );
    (harness, faulty)
}
