//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `RELAYCORD_DISCORD_TOKEN` - Discord bot token
//! - `RELAYCORD_TELEGRAM_TOKEN` - Telegram bot token
//! - `RELAYCORD_CONFIG` - Config file path

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "RELAYCORD";

/// Apply environment variable overrides to a config.
///
/// This allows tokens to be provided via environment variables instead of
/// the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Some(token) = non_empty_var("DISCORD_TOKEN") {
        config.discord.token = token;
    }
    if let Some(token) = non_empty_var("TELEGRAM_TOKEN") {
        config.telegram.token = token;
    }
    config
}

fn non_empty_var(suffix: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, suffix))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get the config file path from environment or use default.
///
/// Checks `RELAYCORD_CONFIG`, otherwise returns "relaycord.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "relaycord.conf".to_string())
}
