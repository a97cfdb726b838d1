//! serenity-backed implementation of the relay's Discord operations.

use std::sync::Arc;

use serenity::all::{
    ChannelId, ChannelType, CreateChannel, CreateEmbed, CreateEmbedAuthor, CreateMessage, GuildId,
    PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId, UserId,
};
use serenity::async_trait;
use serenity::http::Http;
use tokio::sync::OnceCell;

use crate::common::{DiscordError, DiscordResult};
use crate::relay::platform::{ChannelHandle, ChatPlatform, NewChannel, OutgoingMessage};

/// Permissions granted on relay channels to the allowed role and the bot.
fn relay_permissions() -> Permissions {
    Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY
}

pub struct SerenityPlatform {
    http: Arc<Http>,
    guild_id: Option<GuildId>,
    bot_user: OnceCell<UserId>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, guild_id: Option<GuildId>) -> Self {
        Self {
            http,
            guild_id,
            bot_user: OnceCell::new(),
        }
    }

    async fn bot_user(&self) -> DiscordResult<UserId> {
        self.bot_user
            .get_or_try_init(|| async {
                let user = self.http.get_current_user().await?;
                Ok::<_, DiscordError>(user.id)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn fetch_channel(&self, channel_id: ChannelId) -> DiscordResult<ChannelHandle> {
        let channel = channel_id.to_channel(&self.http).await?;
        let guild_channel = channel.guild().ok_or(DiscordError::ChannelNotFound {
            channel_id: channel_id.get(),
        })?;
        Ok(ChannelHandle {
            id: guild_channel.id,
            name: guild_channel.name,
        })
    }

    async fn create_channel(&self, channel: &NewChannel) -> DiscordResult<ChannelHandle> {
        let guild_id = self.guild_id.ok_or_else(|| DiscordError::Rejected {
            message: "no guild configured for relay channels".to_string(),
        })?;

        // @everyone shares the guild's id
        let mut overwrites = vec![
            PermissionOverwrite {
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
                kind: PermissionOverwriteType::Role(RoleId::new(guild_id.get())),
            },
            PermissionOverwrite {
                allow: relay_permissions(),
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Member(self.bot_user().await?),
            },
        ];
        if let Some(role_id) = channel.allowed_role_id {
            overwrites.push(PermissionOverwrite {
                allow: relay_permissions(),
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Role(role_id),
            });
        }

        let mut builder = CreateChannel::new(channel.name.as_str())
            .kind(ChannelType::Text)
            .permissions(overwrites);
        if let Some(topic) = &channel.topic {
            builder = builder.topic(topic.as_str());
        }
        if let Some(category_id) = channel.category_id {
            builder = builder.category(category_id);
        }

        let created = guild_id.create_channel(&self.http, builder).await?;
        Ok(ChannelHandle {
            id: created.id,
            name: created.name,
        })
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> DiscordResult<()> {
        channel_id.delete(&self.http).await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, message: &OutgoingMessage) -> DiscordResult<()> {
        let mut builder = CreateMessage::new().content(message.content.as_str());
        if let Some(author) = &message.author {
            let embed = CreateEmbed::new().author(
                CreateEmbedAuthor::new(author.name.as_str()).icon_url(author.icon_url.as_str()),
            );
            builder = builder.embed(embed);
        }
        channel_id.send_message(&self.http, builder).await?;
        Ok(())
    }
}
