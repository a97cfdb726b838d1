//! Courier - Discord <-> game server chat relay
//!
//! Relays chat between Discord channels and game servers that poll an HTTP
//! API. Each game server gets its own private Discord channel, created on
//! first contact; a single fixed channel can be used instead.

mod api;
mod common;
mod config;
mod discord;
mod relay;

use std::sync::Arc;

use anyhow::Result;
use serenity::all::{ChannelId, GuildId, RoleId};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use api::{create_router, AppState};
use config::load_and_validate;
use discord::{BridgeHandler, ConnectionState, DiscordBotBuilder, SerenityPlatform};
use relay::{ChannelSettings, InboundHandler, MessageFilter, OutboundFormat, OutboundRelay, TenantRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Courier v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_and_validate().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Set DISCORD_BOT_TOKEN and DISCORD_GUILD_ID (or DISCORD_CHANNEL_ID) in the environment or a .env file.");
        e
    })?;

    info!("Configuration loaded successfully");
    match config.discord.channel_id {
        Some(channel_id) => info!("  Mode: single channel ({})", channel_id),
        None => info!("  Mode: one channel per game server"),
    }
    if let Some(guild_id) = config.discord.guild_id {
        info!("  Guild: {}", guild_id);
    }
    if let Some(category_id) = config.discord.category_id {
        info!("  Category: {}", category_id);
    }
    if let Some(role_id) = config.discord.allowed_role_id {
        info!("  Allowed role: {}", role_id);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ============================================================
    // Discord client and relay core
    // ============================================================
    let discord_bot = DiscordBotBuilder::new(config.discord.token.clone(), shutdown_rx.clone())
        .build()
        .await?;

    let platform = Arc::new(SerenityPlatform::new(
        discord_bot.http(),
        config.discord.guild_id.map(GuildId::new),
    ));
    let settings = ChannelSettings {
        prefix: config.relay.channel_prefix.clone(),
        category_id: config.discord.category_id.map(ChannelId::new),
        allowed_role_id: config.discord.allowed_role_id.map(RoleId::new),
    };
    let mut registry = TenantRegistry::new(platform, settings);
    if let Some(channel_id) = config.discord.channel_id {
        registry = registry.with_pinned_channel(ChannelId::new(channel_id));
    }
    let registry = Arc::new(registry);

    let filter = Arc::new(MessageFilter::from_config(&config.filters)?);
    if filter.rule_count() > 0 {
        info!("Message filtering enabled ({} rules)", filter.rule_count());
    }

    let inbound = Arc::new(InboundHandler::new(registry.clone(), filter.clone()));
    let outbound = Arc::new(OutboundRelay::new(
        registry.clone(),
        filter,
        OutboundFormat {
            source_label: config.relay.source_label.clone(),
            avatar_url_template: config.relay.avatar_url_template.clone(),
        },
    ));

    let connection = ConnectionState::new();
    let handler = BridgeHandler::new(inbound, connection.clone());

    info!("Starting Discord bot...");
    let mut discord_task = tokio::spawn(discord_bot.run(handler));

    // ============================================================
    // HTTP polling API
    // ============================================================
    let router = create_router(AppState {
        registry,
        relay: outbound,
        connection,
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!("Server running on {}", listener.local_addr()?);
    info!("Endpoints:");
    info!("   GET  /messages          - Fetch Discord messages");
    info!("   POST /send              - Send message to Discord");
    info!("   POST /register-server   - Create a server's relay channel");
    info!("   POST /unregister-server - Remove a server's relay channel");
    info!("   GET  /health            - Check server status");

    let mut server_task = {
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server error: {}", e);
            }
            info!("HTTP server stopped");
        })
    };

    // ============================================================
    // Run until a signal or a task exits
    // ============================================================
    tokio::select! {
        biased;
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = &mut discord_task => warn!("Discord task exited"),
        _ = &mut server_task => warn!("HTTP server exited"),
    }

    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown channel closed (tasks already exited): {}", e);
    }
    let timeout = tokio::time::Duration::from_secs(5);
    for (name, task) in [("Discord", discord_task), ("HTTP server", server_task)] {
        if task.is_finished() {
            continue;
        }
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => debug!("{} task stopped", name),
            Ok(Err(e)) => warn!("{} task panicked: {}", name, e),
            Err(_) => warn!("{} shutdown timed out", name),
        }
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
