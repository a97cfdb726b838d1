//! Discord -> game server relay.
//!
//! Buffers messages posted in relay channels until the owning game server
//! polls for them.

use std::sync::Arc;

use chrono::Utc;
use serenity::all::ChannelId;
use tracing::{debug, info};

use crate::relay::buffer::RelayedMessage;
use crate::relay::filter::{FilterDirection, MessageFilter};
use crate::relay::registry::TenantRegistry;

/// A message posted in a Discord guild channel.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub channel_id: ChannelId,
    pub message_id: String,
    /// Display name of the author.
    pub author_name: String,
    /// Bots and webhooks, including this bridge.
    pub author_is_bot: bool,
    pub content: String,
    /// Attachment URLs, relayed as text after the content.
    pub attachments: Vec<String>,
}

impl InboundEvent {
    /// Text as posted, followed by attachment URLs.
    fn full_content(&self) -> String {
        let mut full = self.content.clone();
        for url in &self.attachments {
            if !full.is_empty() {
                full.push(' ');
            }
            full.push_str(url);
        }
        full
    }
}

pub struct InboundHandler {
    registry: Arc<TenantRegistry>,
    filter: Arc<MessageFilter>,
}

impl InboundHandler {
    pub fn new(registry: Arc<TenantRegistry>, filter: Arc<MessageFilter>) -> Self {
        Self { registry, filter }
    }

    /// Buffer the event for its server.
    ///
    /// Returns the server id the message was buffered for, or `None` when it
    /// was ignored.
    pub async fn handle(&self, event: InboundEvent) -> Option<String> {
        if event.author_is_bot {
            return None;
        }

        let Some(tenant_id) = self.registry.reverse_resolve(event.channel_id).await else {
            debug!(
                channel_id = event.channel_id.get(),
                "Ignoring message from a channel not linked to any server"
            );
            return None;
        };

        let content = event.full_content();
        if let Some(rule) = self.filter.blocked_by(FilterDirection::FromDiscord, &content) {
            info!("FILTERED Discord -> {} by '{}': {}", tenant_id, rule, content);
            return None;
        }

        let message = RelayedMessage {
            id: event.message_id,
            username: event.author_name,
            content,
            timestamp: Utc::now().timestamp_millis(),
        };
        let (author, text) = (message.username.clone(), message.content.clone());

        if !self.registry.append(&tenant_id, message).await {
            debug!(server_id = %tenant_id, "Server unregistered before message was buffered");
            return None;
        }

        info!("Discord -> {} [{}]: {}", tenant_id, author, text);
        Some(tenant_id)
    }
}
