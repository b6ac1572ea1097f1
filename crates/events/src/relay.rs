//! Forwards created notifications to external channels.
//!
//! [`ChannelRelay`] subscribes to the event bus and, for every
//! [`NoteEvent::NotificationCreated`], pushes the notification to the
//! configured webhook and emails the recipient if an address is known.
//! Delivery is best-effort: failures are logged and never reach the engine.

use std::collections::HashMap;
use std::sync::Arc;

use notices_core::error::CoreError;
use notices_core::types::DbId;
use notices_db::models::Notification;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::NoteEvent;
use crate::delivery::email::{EmailConfig, EmailDelivery};
use crate::delivery::webhook::{WebhookDelivery, WebhookError};

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Channel settings for the relay.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub webhook_url: Option<String>,
    /// Recipient email addresses keyed by user id.
    pub user_emails: HashMap<DbId, String>,
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable             | Required | Default |
    /// |----------------------|----------|---------|
    /// | `NOTIFY_WEBHOOK_URL` | no       |         |
    /// | `USER_EMAILS`        | no       |         |
    ///
    /// `USER_EMAILS` is a comma-separated list of `user_id=address` pairs.
    pub fn from_env() -> Result<Self, CoreError> {
        let user_emails = match std::env::var("USER_EMAILS") {
            Ok(list) => parse_user_emails(&list)?,
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            user_emails,
        })
    }
}

/// Parse `201=a@example.org,202=b@example.org`.
pub fn parse_user_emails(list: &str) -> Result<HashMap<DbId, String>, CoreError> {
    let mut emails = HashMap::new();
    for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, address) = pair.split_once('=').ok_or_else(|| {
            CoreError::Validation(format!("Invalid user email entry '{pair}'"))
        })?;
        let id: DbId = id.trim().parse().map_err(|_| {
            CoreError::Validation(format!("Invalid user id in email entry '{pair}'"))
        })?;
        emails.insert(id, address.trim().to_string());
    }
    Ok(emails)
}

// ---------------------------------------------------------------------------
// ChannelRelay
// ---------------------------------------------------------------------------

/// Pushes notifications to webhook and email channels.
pub struct ChannelRelay {
    webhook: Option<WebhookDelivery>,
    email: Option<EmailDelivery>,
    user_emails: HashMap<DbId, String>,
}

impl ChannelRelay {
    pub fn new(
        webhook: Option<WebhookDelivery>,
        email: Option<EmailDelivery>,
        user_emails: HashMap<DbId, String>,
    ) -> Self {
        Self {
            webhook,
            email,
            user_emails,
        }
    }

    /// Build the relay from configuration. Channels that are not configured
    /// are left out.
    pub fn from_config(
        config: RelayConfig,
        email: Option<EmailConfig>,
    ) -> Result<Self, WebhookError> {
        let webhook = config.webhook_url.map(WebhookDelivery::new).transpose()?;
        Ok(Self::new(
            webhook,
            email.map(EmailDelivery::new),
            config.user_emails,
        ))
    }

    /// Whether any outbound channel is configured.
    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some() || self.email.is_some()
    }

    /// Run the relay loop until cancelled or the bus closes.
    ///
    /// Each notification is delivered on its own task so one slow endpoint
    /// does not hold up the rest.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<NoteEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Channel relay cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(NoteEvent::NotificationCreated(notification)) => {
                        if self.is_enabled() {
                            let relay = Arc::clone(&self);
                            tokio::spawn(async move { relay.relay(&notification).await });
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Channel relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, channel relay shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Deliver one notification to every configured channel.
    pub async fn relay(&self, notification: &Notification) {
        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.deliver(notification).await {
                tracing::error!(
                    notification_id = notification.id,
                    recipient_id = notification.recipient_id,
                    error = %e,
                    "Webhook relay failed"
                );
            }
        }

        if let Some(email) = &self.email {
            let Some(address) = self.user_emails.get(&notification.recipient_id) else {
                tracing::debug!(
                    recipient_id = notification.recipient_id,
                    "No email address for recipient, skipping"
                );
                return;
            };
            if let Err(e) = email.deliver(address, notification).await {
                tracing::error!(
                    notification_id = notification.id,
                    recipient_id = notification.recipient_id,
                    error = %e,
                    "Email relay failed"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use std::time::Duration;

    #[test]
    fn parse_user_emails_list() {
        let emails = parse_user_emails("201=r1@example.org, 202 = r2@example.org,").unwrap();
        assert_eq!(emails.get(&201).map(String::as_str), Some("r1@example.org"));
        assert_eq!(emails.get(&202).map(String::as_str), Some("r2@example.org"));
    }

    #[test]
    fn parse_user_emails_rejects_bad_ids() {
        assert!(parse_user_emails("abc=r1@example.org").is_err());
        assert!(parse_user_emails("201").is_err());
    }

    #[test]
    fn relay_without_channels_is_disabled() {
        let relay = ChannelRelay::from_config(RelayConfig::default(), None).unwrap();
        assert!(!relay.is_enabled());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let bus = EventBus::default();
        let relay = Arc::new(ChannelRelay::new(None, None, HashMap::new()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay.run(bus.subscribe(), cancel.clone()));

        bus.publish(NoteEvent::comment_added(1, 2, 3));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn run_stops_when_bus_is_dropped() {
        let bus = EventBus::default();
        let relay = Arc::new(ChannelRelay::new(None, None, HashMap::new()));
        let handle = tokio::spawn(relay.run(bus.subscribe(), CancellationToken::new()));

        drop(bus);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay should stop")
            .unwrap();
    }
}
