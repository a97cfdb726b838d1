//! Discord bot integration.
//!
//! This module owns the serenity gateway connection and the REST calls the
//! relay makes on Discord.

pub mod client;
pub mod handler;
pub mod platform;

// Re-export main types for external use
pub use client::DiscordBotBuilder;
pub use handler::{BridgeHandler, ConnectionState};
pub use platform::SerenityPlatform;
