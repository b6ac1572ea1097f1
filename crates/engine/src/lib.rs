//! Note lifecycle and hierarchical validation workflow engine.
//!
//! - [`NoteWorkflow`]: the note state machine (draft, submit, approve,
//!   return, schedule, send, archive, delete).
//! - [`ScheduleDispatcher`]: sends due notes and materializes deliveries.
//! - [`DeliveryTracker`]: per-recipient read/archive state.
//! - [`NotificationDispatcher`]: notification fan-out and inbox operations.
//! - [`AuditLog`]: note history.
//! - [`background`]: reminder and retention loops.
//!
//! [`Engine`] wires these together over a set of [`Stores`].

use std::sync::Arc;

use notices_core::hierarchy::Directory;
use notices_db::{AuditStore, DeliveryStore, NoteStore, NotificationStore};
use notices_events::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod audit;
pub mod background;
pub mod config;
pub mod locks;
pub mod notifier;
pub mod scheduler;
pub mod tracker;
pub mod workflow;

pub use audit::AuditLog;
pub use background::reminders::ReminderSweep;
pub use config::{ConfigError, EngineConfig};
pub use locks::NoteLocks;
pub use notifier::{FanOut, NotificationDispatcher};
pub use scheduler::{ScheduleDispatcher, SweepReport};
pub use tracker::DeliveryTracker;
pub use workflow::{NewDraft, NoteWorkflow};

/// The storage the engine runs on, one handle per concern.
#[derive(Clone)]
pub struct Stores {
    pub notes: Arc<dyn NoteStore>,
    pub audit: Arc<dyn AuditStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// Use one backend for every concern.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: NoteStore + AuditStore + DeliveryStore + NotificationStore + 'static,
    {
        Self {
            notes: store.clone(),
            audit: store.clone(),
            deliveries: store.clone(),
            notifications: store,
        }
    }
}

/// Process-wide engine state, created at service start.
pub struct Engine {
    pub workflow: Arc<NoteWorkflow>,
    pub scheduler: Arc<ScheduleDispatcher>,
    pub tracker: DeliveryTracker,
    pub notifications: Arc<NotificationDispatcher>,
    pub audit: AuditLog,
    pub reminders: Arc<ReminderSweep>,
    stores: Stores,
    bus: Arc<EventBus>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        stores: Stores,
        directory: Arc<dyn Directory>,
        bus: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        let locks = Arc::new(NoteLocks::new(config.lock_timeout));
        let notifications = Arc::new(NotificationDispatcher::new(
            Arc::clone(&stores.notifications),
            Arc::clone(&bus),
            config.notify_max_attempts,
            config.notify_retry_delay,
        ));
        let workflow = Arc::new(NoteWorkflow::new(
            Arc::clone(&stores.notes),
            Arc::clone(&stores.audit),
            directory,
            Arc::clone(&locks),
            Arc::clone(&notifications),
            Arc::clone(&bus),
        ));
        let scheduler = Arc::new(ScheduleDispatcher::new(
            Arc::clone(&workflow),
            Arc::clone(&stores.notes),
            Arc::clone(&stores.deliveries),
            Arc::clone(&notifications),
            locks,
            &config,
        ));
        let reminders = Arc::new(ReminderSweep::new(
            Arc::clone(&stores.notes),
            Arc::clone(&notifications),
            config.reminder_after,
            config.dispatch_batch_size,
        ));

        Self {
            workflow,
            scheduler,
            tracker: DeliveryTracker::new(Arc::clone(&stores.deliveries)),
            notifications,
            audit: AuditLog::new(Arc::clone(&stores.audit)),
            reminders,
            stores,
            bus,
            config,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the dispatcher, reminder and retention loops. They stop when
    /// `cancel` is cancelled.
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let dispatcher = tokio::spawn(Arc::clone(&self.scheduler).run(cancel.clone()));
        let reminders = tokio::spawn(
            Arc::clone(&self.reminders).run(self.config.reminder_interval, cancel.clone()),
        );
        let retention = tokio::spawn(background::retention::run(
            Arc::clone(&self.stores.notifications),
            self.config.notification_retention,
            self.config.retention_interval,
            cancel.clone(),
        ));
        vec![dispatcher, reminders, retention]
    }
}
