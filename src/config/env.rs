//! Environment variable configuration.
//!
//! Reads the bridge configuration from:
//! - `DISCORD_BOT_TOKEN` - Discord bot token
//! - `DISCORD_GUILD_ID` - Guild that owns relay channels
//! - `DISCORD_CHANNEL_ID` - Fixed relay channel (single-channel mode)
//! - `DISCORD_CATEGORY_ID` - Category for created channels
//! - `DISCORD_ALLOWED_ROLE_ID` - Role allowed to see created channels
//! - `PORT` / `BIND_ADDRESS` - HTTP listener
//! - `CHANNEL_PREFIX` / `SOURCE_LABEL` / `AVATAR_URL_TEMPLATE` - presentation
//! - `FILTER_TO_DISCORD` / `FILTER_FROM_DISCORD` - JSON arrays of regex patterns
//!
//! A `.env` file in the working directory is loaded first, if present.

use std::env;

use tracing::debug;

use crate::common::ConfigError;
use crate::config::types::{Config, DiscordConfig, FiltersConfig, HttpConfig, RelayConfig};

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<Config, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    }

    from_lookup(|key| env::var(key).ok())
}

/// Build a config from an arbitrary variable lookup.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Blank values count as unset
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let discord = DiscordConfig {
        token: get("DISCORD_BOT_TOKEN").unwrap_or_default(),
        guild_id: parse_id(&get, "DISCORD_GUILD_ID")?,
        channel_id: parse_id(&get, "DISCORD_CHANNEL_ID")?,
        category_id: parse_id(&get, "DISCORD_CATEGORY_ID")?,
        allowed_role_id: parse_id(&get, "DISCORD_ALLOWED_ROLE_ID")?,
    };

    let mut http = HttpConfig::default();
    if let Some(port) = get("PORT") {
        http.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "PORT".to_string(),
            message: format!("'{}' is not a valid port", port),
        })?;
    }
    if let Some(address) = get("BIND_ADDRESS") {
        http.bind_address = address;
    }

    let mut relay = RelayConfig::default();
    if let Some(prefix) = get("CHANNEL_PREFIX") {
        relay.channel_prefix = prefix;
    }
    if let Some(label) = get("SOURCE_LABEL") {
        relay.source_label = label;
    }
    relay.avatar_url_template = get("AVATAR_URL_TEMPLATE");

    let filters = FiltersConfig {
        to_discord: parse_patterns(&get, "FILTER_TO_DISCORD")?,
        from_discord: parse_patterns(&get, "FILTER_FROM_DISCORD")?,
    };

    Ok(Config {
        discord,
        http,
        relay,
        filters,
    })
}

fn parse_id<F>(get: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                message: format!("'{}' is not a Discord snowflake", raw),
            }),
            Ok(id) => Ok(Some(id)),
        },
    }
}

fn parse_patterns<F>(get: &F, key: &str) -> Result<Option<Vec<String>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            serde_json::from_str::<Vec<String>>(&raw).map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                message: format!("expected a JSON array of strings: {}", e),
            })
        })
        .transpose()
}
