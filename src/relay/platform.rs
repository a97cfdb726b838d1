//! Chat platform seam.
//!
//! The relay only needs four Discord operations. They sit behind
//! [`ChatPlatform`] so the registry and handlers can run against an
//! in-memory platform in tests.

use serenity::all::{ChannelId, RoleId};
use serenity::async_trait;

use crate::common::DiscordResult;

/// A live Discord channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: ChannelId,
    pub name: String,
}

/// Options for a relay channel the bridge creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub topic: Option<String>,
    /// Parent category.
    pub category_id: Option<ChannelId>,
    /// Role explicitly allowed to see the channel; everyone else is denied.
    pub allowed_role_id: Option<RoleId>,
}

/// Attribution shown alongside a relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAuthor {
    pub name: String,
    pub icon_url: String,
}

/// A message to post into a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub author: Option<MessageAuthor>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author: None,
        }
    }
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetch a channel, failing if it no longer exists.
    async fn fetch_channel(&self, channel_id: ChannelId) -> DiscordResult<ChannelHandle>;

    async fn create_channel(&self, channel: &NewChannel) -> DiscordResult<ChannelHandle>;

    async fn delete_channel(&self, channel_id: ChannelId) -> DiscordResult<()>;

    async fn send_message(&self, channel_id: ChannelId, message: &OutgoingMessage) -> DiscordResult<()>;
}
