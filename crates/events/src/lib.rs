//! Engine event bus and outbound notification channels.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`NoteEvent`]: the events the workflow engine publishes.
//! - [`delivery`]: external delivery channels (webhook, email).
//! - [`ChannelRelay`]: forwards created notifications to those channels.

pub mod bus;
pub mod delivery;
pub mod relay;

pub use bus::{EventBus, NoteEvent};
pub use delivery::email::{EmailConfig, EmailDelivery, EmailError};
pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use relay::{ChannelRelay, RelayConfig};
