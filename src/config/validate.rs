//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::ConfigError;
use crate::config::types::Config;
use crate::relay::filter::{FilterDirection, RuleSet};

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate Discord config
    if config.discord.token.is_empty() {
        errors.push("DISCORD_BOT_TOKEN is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("DISCORD_BOT_TOKEN has not been configured (still using placeholder)".to_string());
    }
    if config.discord.guild_id.is_none() && config.discord.channel_id.is_none() {
        errors.push(
            "DISCORD_GUILD_ID is required unless DISCORD_CHANNEL_ID selects single-channel mode"
                .to_string(),
        );
    }

    // Validate HTTP listener
    if config.http.port == 0 {
        errors.push("PORT must be non-zero".to_string());
    }
    if config.http.bind_address.is_empty() {
        errors.push("BIND_ADDRESS must not be empty".to_string());
    }

    // Validate relay presentation
    let prefix = &config.relay.channel_prefix;
    if prefix.is_empty() {
        errors.push("CHANNEL_PREFIX must not be empty".to_string());
    } else if !prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        errors.push(format!(
            "CHANNEL_PREFIX '{}' may only contain lowercase letters, digits, '-' and '_'",
            prefix
        ));
    }
    if let Some(ref template) = config.relay.avatar_url_template {
        if !template.contains("{userId}") {
            errors.push("AVATAR_URL_TEMPLATE must contain a {userId} placeholder".to_string());
        }
    }

    // Validate filter rules (try to compile them)
    for (direction, patterns) in [
        (FilterDirection::ToDiscord, &config.filters.to_discord),
        (FilterDirection::FromDiscord, &config.filters.from_discord),
    ] {
        if let Err(problems) = RuleSet::compile(direction, patterns.as_deref().unwrap_or_default()) {
            errors.extend(problems);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
