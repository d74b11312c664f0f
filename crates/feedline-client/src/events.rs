//! Notifications from the client core to whatever renders it.

use feedline_shared::types::{PostId, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The cached feed was replaced or one of its posts changed.
    FeedUpdated,
    /// The open comment thread was reloaded.
    ThreadUpdated { post_id: PostId },
    /// The signed-in user's cached profile changed.
    ProfileChanged { user_id: UserId },
    /// A user's post list was re-fetched.
    UserPostsUpdated { user_id: UserId },
    /// Sign-in or sign-out.
    SessionChanged { user_id: Option<UserId> },
    /// Something the user should be told about.
    Alert { title: String, message: String },
}

/// Broadcast fan-out of [`ClientEvent`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Nobody listening is fine.
    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("client event dropped, no listeners");
        }
    }

    pub fn alert(&self, title: impl Into<String>, message: impl Into<String>) {
        let (title, message) = (title.into(), message.into());
        tracing::warn!(title = %title, message = %message, "alert");
        self.emit(ClientEvent::Alert { title, message });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_alerts() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.alert("Upload Failed", "Failed to upload image");

        assert_eq!(
            rx.recv().await.unwrap(),
            ClientEvent::Alert {
                title: "Upload Failed".into(),
                message: "Failed to upload image".into(),
            }
        );
    }

    #[test]
    fn emit_without_listeners_is_fine() {
        EventBus::new().emit(ClientEvent::FeedUpdated);
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(ClientEvent::SessionChanged { user_id: None }).unwrap();
        assert_eq!(json["type"], "session_changed");
    }
}
