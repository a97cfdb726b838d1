//! Configuration type definitions.

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    pub http: HttpConfig,
    pub relay: RelayConfig,
    pub filters: FiltersConfig,
}

/// Discord bot configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    /// Guild that owns the per-server relay channels.
    pub guild_id: Option<u64>,
    /// Fixed relay channel; its presence enables single-channel mode.
    pub channel_id: Option<u64>,
    /// Category new relay channels are parented under.
    pub category_id: Option<u64>,
    /// Role granted access to new relay channels.
    pub allowed_role_id: Option<u64>,
}

/// HTTP polling API listener.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind_address: String,
    pub port: u16,
}

/// Relay presentation settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Prefix for created channel names (`<prefix>-<first 8 chars of server id>`).
    pub channel_prefix: String,
    /// Label shown after the sender name in relayed messages.
    pub source_label: String,
    /// Avatar URL with a `{userId}` placeholder.
    pub avatar_url_template: Option<String>,
}

/// Message filtering configuration.
#[derive(Debug, Clone, Default)]
pub struct FiltersConfig {
    /// Patterns blocking game -> Discord messages.
    pub to_discord: Option<Vec<String>>,
    /// Patterns blocking Discord -> game messages.
    pub from_discord: Option<Vec<String>>,
}

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_CHANNEL_PREFIX: &str = "server";
pub const DEFAULT_SOURCE_LABEL: &str = "External";

impl Config {
    /// Socket address string the HTTP API binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http.bind_address, self.http.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
            avatar_url_template: None,
        }
    }
}
