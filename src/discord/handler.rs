//! Discord event handling.
//!
//! Turns gateway events into relay operations and tracks whether the
//! gateway connection is up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use tracing::{debug, info};

use crate::relay::{InboundEvent, InboundHandler};

/// Shared flag reporting whether the Discord gateway is connected.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState(Arc<AtomicBool>);

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Discord event handler.
pub struct BridgeHandler {
    inbound: Arc<InboundHandler>,
    connection: ConnectionState,
}

impl BridgeHandler {
    pub fn new(inbound: Arc<InboundHandler>, connection: ConnectionState) -> Self {
        Self { inbound, connection }
    }

    pub fn handle_ready(&self, ready: &Ready) {
        info!(
            "Discord bot logged in as {} ({} guilds)",
            ready.user.name,
            ready.guilds.len()
        );
        self.connection.set_connected(true);
    }

    pub fn handle_connection_change(&self, connected: bool) {
        if self.connection.is_connected() != connected {
            info!(
                "Discord gateway {}",
                if connected { "connected" } else { "disconnected" }
            );
        }
        self.connection.set_connected(connected);
    }

    pub async fn handle_message(&self, message: Message) {
        let Some(event) = to_inbound_event(&message) else {
            debug!(message_id = message.id.get(), "Ignoring direct message");
            return;
        };
        self.inbound.handle(event).await;
    }
}

/// Convert a guild message into a relay event. Direct messages yield `None`.
pub fn to_inbound_event(message: &Message) -> Option<InboundEvent> {
    message.guild_id?;

    // Effective display name: server nickname, then global name, then username
    let author_name = message
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .or_else(|| message.author.global_name.clone())
        .unwrap_or_else(|| message.author.name.clone());

    Some(InboundEvent {
        channel_id: message.channel_id,
        message_id: message.id.to_string(),
        author_name,
        author_is_bot: message.author.bot || message.webhook_id.is_some(),
        content: message.content.clone(),
        attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    /// Gateway MESSAGE_CREATE payload for a guild text message.
    fn payload() -> Value {
        json!({
            "id": "1100",
            "channel_id": "42",
            "guild_id": "7",
            "author": {
                "id": "5",
                "username": "alice",
                "global_name": "Alice G",
                "avatar": null,
                "bot": false
            },
            "member": {
                "nick": "Ali",
                "roles": [],
                "deaf": false,
                "mute": false,
                "joined_at": "2024-01-01T00:00:00+00:00"
            },
            "content": "  hello there  ",
            "timestamp": "2024-01-01T12:00:00+00:00",
            "edited_timestamp": null,
            "tts": false,
            "mention_everyone": false,
            "mentions": [],
            "mention_roles": [],
            "attachments": [{
                "id": "9",
                "filename": "map.png",
                "proxy_url": "https://media.example/map.png",
                "size": 1024,
                "url": "https://cdn.example/map.png"
            }],
            "embeds": [],
            "pinned": false,
            "type": 0
        })
    }

    fn message(payload: Value) -> Message {
        serde_json::from_value(payload).unwrap()
    }

    #[test]
    fn test_guild_message_converted() {
        let event = to_inbound_event(&message(payload())).unwrap();

        assert_eq!(event.channel_id, serenity::all::ChannelId::new(42));
        assert_eq!(event.message_id, "1100");
        assert_eq!(event.author_name, "Ali");
        assert!(!event.author_is_bot);
        assert_eq!(event.content, "  hello there  ");
        assert_eq!(event.attachments, vec!["https://cdn.example/map.png"]);
    }

    #[test]
    fn test_direct_message_skipped() {
        let mut dm = payload();
        dm.as_object_mut().unwrap().remove("guild_id");
        dm.as_object_mut().unwrap().remove("member");

        assert!(to_inbound_event(&message(dm)).is_none());
    }

    #[test]
    fn test_display_name_fallback() {
        let mut no_nick = payload();
        no_nick["member"]["nick"] = Value::Null;
        assert_eq!(to_inbound_event(&message(no_nick.clone())).unwrap().author_name, "Alice G");

        no_nick["author"]["global_name"] = Value::Null;
        assert_eq!(to_inbound_event(&message(no_nick)).unwrap().author_name, "alice");
    }

    #[test]
    fn test_bots_and_webhooks_flagged() {
        let mut from_bot = payload();
        from_bot["author"]["bot"] = json!(true);
        assert!(to_inbound_event(&message(from_bot)).unwrap().author_is_bot);

        let mut from_webhook = payload();
        from_webhook["webhook_id"] = json!("3333");
        assert!(to_inbound_event(&message(from_webhook)).unwrap().author_is_bot);
    }

    #[test]
    fn test_connection_state_shared() {
        let state = ConnectionState::new();
        let clone = state.clone();
        assert!(!state.is_connected());

        clone.set_connected(true);
        assert!(state.is_connected());

        state.set_connected(false);
        assert!(!clone.is_connected());
    }
}
