//! Relaycord - Discord-Telegram channel bridge
//!
//! Relays messages between linked Discord channels and Telegram chats,
//! with bridge links and bot settings hot-reloaded from the config file.

mod bridge;
mod common;
mod config;
mod discord;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bridge::{run_event_pump, ClientSupervisor, LinkTableManager, RelayDispatcher};
use common::InboundEvent;
use config::watcher::{run_reload_loop, ConfigWatcher};
use config::{env::get_config_path, load_and_validate};
use discord::{DiscordBot, DiscordSender};
use telegram::{TelegramBot, TelegramSender};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Relaycord v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Bridge links: {}", config.bridge.links.len());
    info!("  Relay bot messages: {}", config.discord.relay_bots);

    let links = Arc::new(LinkTableManager::from_config(&config.bridge.links)?);
    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel::<InboundEvent>();

    // Platform clients
    let telegram_bot =
        TelegramBot::connect(&config.telegram.token, config.telegram.poll_timeout_secs).await?;
    let discord_bot = DiscordBot::build(
        config.discord.token.clone(),
        config.discord.relay_bots,
        events_tx.clone(),
    )
    .await?;

    let discord_sender = Arc::new(DiscordSender::new(discord_bot.http()));
    let telegram_sender = Arc::new(TelegramSender::new(telegram_bot.bot()));

    let dispatcher = Arc::new(RelayDispatcher::new(
        links.clone(),
        discord_sender.clone(),
        telegram_sender.clone(),
        cancel.clone(),
    ));
    let supervisor =
        ClientSupervisor::new(discord_sender, telegram_sender, events_tx, cancel.clone());
    let (restarts_tx, restarts_rx) = mpsc::unbounded_channel();

    let mut tasks = JoinSet::new();
    tasks.spawn(run_event_pump(dispatcher, events_rx, cancel.clone()));
    tasks.spawn(supervisor.run(discord_bot, telegram_bot, restarts_rx));

    // Hot reload. The bridge keeps running without it.
    let config_path = PathBuf::from(config_path);
    let _watcher = match ConfigWatcher::start(&config_path) {
        Ok((watcher, watch_events)) => {
            tasks.spawn(run_reload_loop(
                config_path,
                links,
                config,
                watch_events,
                restarts_tx,
                cancel.clone(),
            ));
            Some(watcher)
        }
        Err(e) => {
            warn!("Config watcher unavailable, config changes need a restart: {}", e);
            None
        }
    };

    info!("Bridge running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping bridge...");
        }
        Some(result) = tasks.join_next() => {
            if let Err(e) = result {
                error!("Bridge task failed: {}", e);
            } else {
                warn!("Bridge task exited unexpectedly, shutting down");
            }
        }
    }

    cancel.cancel();

    let drain = async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Bridge task failed during shutdown: {}", e);
            }
        }
    };
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await;
    if drained.is_err() {
        warn!("Shutdown timed out, aborting remaining tasks");
        tasks.abort_all();
    } else {
        info!("Shutdown complete");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
