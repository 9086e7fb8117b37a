//! Real-time change notifications.
//!
//! # Responsibility
//! - Define the push client contract (`trigger(channel, event, payload)`).
//! - Shape tenant change pointers into channel/event/payload triples.
//! - Provide an in-process broadcast client for embedding and tests.
//!
//! # Invariants
//! - Payloads carry only an incident id (or null), never incident content.
//! - Each tenant is addressed through its own private channel.

use crate::model::event::NotificationSignal;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::broadcast;

/// Event name clients subscribe to for incident changes.
pub const INCIDENT_CHANGE_EVENT: &str = "incident-change";

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Notification transport failure.
#[derive(Debug)]
pub enum NotifyError {
    Transport(String),
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "notification transport failed: {message}"),
        }
    }
}

impl Error for NotifyError {}

/// Push transport consumed by the change notifier.
pub trait NotificationClient: Send + Sync {
    fn trigger(&self, channel: &str, event: &str, payload: &Value) -> NotifyResult<()>;
}

/// Private channel name for one tenant.
pub fn tenant_channel(tenant_id: &str) -> String {
    format!("private-{tenant_id}")
}

/// Sends one change pointer through the given client.
pub fn send_change_signal(
    client: &dyn NotificationClient,
    signal: &NotificationSignal,
) -> NotifyResult<()> {
    let payload = json!({
        "incident_id": signal.incident_id.map(|id| id.to_string()),
    });
    client.trigger(
        tenant_channel(&signal.tenant_id).as_str(),
        INCIDENT_CHANGE_EVENT,
        &payload,
    )
}

/// Message observed by broadcast subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// In-process notification client backed by a tokio broadcast channel.
///
/// Sending with no live subscriber is not an error: nobody is listening.
pub struct BroadcastNotificationClient {
    sender: broadcast::Sender<PushMessage>,
}

impl BroadcastNotificationClient {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to every message sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotificationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationClient for BroadcastNotificationClient {
    fn trigger(&self, channel: &str, event: &str, payload: &Value) -> NotifyResult<()> {
        if channel.trim().is_empty() {
            return Err(NotifyError::Transport("channel name is empty".to_string()));
        }

        let message = PushMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };
        // send only fails when there is no receiver
        let _ = self.sender.send(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        send_change_signal, tenant_channel, BroadcastNotificationClient, INCIDENT_CHANGE_EVENT,
    };
    use crate::model::event::NotificationSignal;
    use serde_json::Value;
    use uuid::Uuid;

    #[test]
    fn channel_is_private_per_tenant() {
        assert_eq!(tenant_channel("acme"), "private-acme");
    }

    #[test]
    fn signal_payload_carries_only_the_incident_id() {
        let client = BroadcastNotificationClient::new();
        let mut receiver = client.subscribe();
        let incident_id = Uuid::new_v4();

        send_change_signal(
            &client,
            &NotificationSignal {
                tenant_id: "acme".to_string(),
                incident_id: Some(incident_id),
            },
        )
        .expect("signal should send");

        let message = receiver.try_recv().expect("message should be buffered");
        assert_eq!(message.channel, "private-acme");
        assert_eq!(message.event, INCIDENT_CHANGE_EVENT);
        let object = message.payload.as_object().expect("payload is an object");
        assert_eq!(object.len(), 1);
        assert_eq!(
            object.get("incident_id").and_then(Value::as_str),
            Some(incident_id.to_string().as_str())
        );
    }

    #[test]
    fn missing_incident_id_is_sent_as_null() {
        let client = BroadcastNotificationClient::new();
        let mut receiver = client.subscribe();
        send_change_signal(
            &client,
            &NotificationSignal {
                tenant_id: "acme".to_string(),
                incident_id: None,
            },
        )
        .expect("signal should send");

        let message = receiver.try_recv().expect("message should be buffered");
        assert_eq!(message.payload.get("incident_id"), Some(&Value::Null));
    }

    #[test]
    fn sending_without_subscribers_succeeds() {
        let client = BroadcastNotificationClient::new();
        send_change_signal(
            &client,
            &NotificationSignal {
                tenant_id: "acme".to_string(),
                incident_id: None,
            },
        )
        .expect("no subscriber is not an error");
    }
}
