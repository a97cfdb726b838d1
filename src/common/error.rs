//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: u64 },

    #[error("Discord request rejected: {message}")]
    Rejected { message: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

impl DiscordError {
    /// True when Discord reports the channel as gone, as opposed to a
    /// transient or permission failure.
    pub fn is_channel_gone(&self) -> bool {
        match self {
            DiscordError::ChannelNotFound { .. } => true,
            DiscordError::Serenity(serenity::Error::Http(
                serenity::http::HttpError::UnsuccessfulRequest(response),
            )) => response.status_code.as_u16() == 404,
            _ => false,
        }
    }
}

/// Errors surfaced by relay and registry operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required request field was absent or blank.
    #[error("Missing {0}")]
    MissingField(String),

    /// The message matched a content rule and was not relayed.
    #[error("Message blocked by filter")]
    Blocked { rule: String },

    /// Background registry work ended without a result (runtime shutdown).
    #[error("Relay operation interrupted")]
    Interrupted,

    /// A Discord call failed while serving the request.
    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        #[source]
        source: DiscordError,
    },
}

impl RelayError {
    pub fn upstream(context: &'static str, source: DiscordError) -> Self {
        RelayError::Upstream { context, source }
    }
}

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;

/// Result type alias for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;
