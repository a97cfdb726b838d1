//! Game server -> Discord relay.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serenity::all::ChannelId;
use tracing::{error, info};

use crate::common::{RelayError, RelayResult};
use crate::relay::filter::{FilterDirection, MessageFilter};
use crate::relay::platform::{MessageAuthor, OutgoingMessage};
use crate::relay::registry::TenantRegistry;

/// A chat message posted by a game server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub server_id: Option<String>,
    pub username: Option<String>,
    pub message: Option<String>,
    /// Game user id, only used for the avatar.
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<u64>,
}

/// Presentation of relayed messages.
#[derive(Debug, Clone)]
pub struct OutboundFormat {
    pub source_label: String,
    pub avatar_url_template: Option<String>,
}

pub struct OutboundRelay {
    registry: Arc<TenantRegistry>,
    filter: Arc<MessageFilter>,
    format: OutboundFormat,
}

impl OutboundRelay {
    pub fn new(registry: Arc<TenantRegistry>, filter: Arc<MessageFilter>, format: OutboundFormat) -> Self {
        Self {
            registry,
            filter,
            format,
        }
    }

    /// Validate and post a message into the server's relay channel,
    /// returning the channel it was posted in.
    ///
    /// Missing fields and blocked content are rejected before any Discord
    /// call is made.
    pub async fn send(&self, request: SendRequest) -> RelayResult<ChannelId> {
        let server_id = present(request.server_id).or_else(|| {
            self.registry
                .default_tenant()
                .map(str::to_string)
        });
        let username = present(request.username);
        let text = present(request.message);

        let (server_id, username, text) = match (server_id, username, text) {
            (Some(s), Some(u), Some(t)) => (s, u, t),
            (s, u, t) => {
                let missing: Vec<&str> = [
                    ("serverId", s.is_none()),
                    ("username", u.is_none()),
                    ("message", t.is_none()),
                ]
                .into_iter()
                .filter_map(|(field, missing)| missing.then_some(field))
                .collect();
                return Err(RelayError::MissingField(missing.join(", ")));
            }
        };

        if let Some(rule) = self.filter.blocked_by(FilterDirection::ToDiscord, &text) {
            info!("FILTERED {} -> Discord [{}]: {}", server_id, username, text);
            return Err(RelayError::Blocked {
                rule: rule.to_string(),
            });
        }

        let channel = self.registry.resolve_or_create(&server_id).await?;
        let message = self.format_message(&username, &text, request.user_id);

        self.registry
            .platform()
            .send_message(channel.id, &message)
            .await
            .map_err(|e| {
                error!(
                    server_id = %server_id,
                    channel_id = channel.id.get(),
                    "Error sending to Discord: {}",
                    e
                );
                RelayError::upstream("Failed to send message", e)
            })?;

        info!("{} -> Discord [#{}] {}: {}", server_id, channel.name, username, text);
        Ok(channel.id)
    }

    fn format_message(&self, username: &str, text: &str, user_id: Option<u64>) -> OutgoingMessage {
        let content = format!("**{}** ({}): {}", username, self.format.source_label, text);

        let author = user_id
            .zip(self.format.avatar_url_template.as_ref())
            .map(|(id, template)| MessageAuthor {
                name: username.to_string(),
                icon_url: template.replace("{userId}", &id.to_string()),
            });

        OutgoingMessage { content, author }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accept a user id as a JSON number or a numeric string.
///
/// Anything else (negative, fractional, malformed) is dropped rather than
/// failing the request, since the id only selects an avatar.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|raw| match raw {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }))
}
