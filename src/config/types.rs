//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub telegram: TelegramConfig,
    pub bridge: BridgeConfig,
}

/// Discord bot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Relay messages posted by other bots (the bridge's own messages are
    /// always ignored).
    #[serde(default)]
    pub relay_bots: bool,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    /// Long-polling timeout for `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u32,
}

fn default_poll_timeout() -> u32 {
    30
}

/// Bridge link list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

/// One configured Discord channel <-> Telegram chat link.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Direction: "bidirectional" (or "both"), "to_telegram", "to_discord".
    pub direction: Option<String>,
    /// Discord channel ID.
    #[serde(default)]
    pub discord_channel: u64,
    /// Telegram chat ID (negative for groups and channels).
    #[serde(default)]
    pub telegram_chat: i64,
}
