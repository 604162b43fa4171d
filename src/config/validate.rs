//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::bridge::links::Direction;
use crate::common::error::ConfigError;
use crate::config::types::Config;

const PLACEHOLDER_TOKENS: [&str; 2] = ["YOUR_DISCORD_TOKEN_HERE", "YOUR_TELEGRAM_TOKEN_HERE"];

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate tokens
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    } else if PLACEHOLDER_TOKENS.contains(&config.discord.token.as_str()) {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if config.telegram.token.is_empty() {
        errors.push("telegram.token is required".to_string());
    } else if PLACEHOLDER_TOKENS.contains(&config.telegram.token.as_str()) {
        errors.push("telegram.token has not been configured (still using placeholder)".to_string());
    }
    if config.telegram.poll_timeout_secs == 0 {
        errors.push("telegram.poll_timeout_secs must be non-zero".to_string());
    }

    errors.extend(validate_links(config));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

/// Validate the bridge links.
fn validate_links(config: &Config) -> Vec<String> {
    let mut errors = Vec::new();

    for (i, link) in config.bridge.links.iter().enumerate() {
        if link.discord_channel == 0 {
            errors.push(format!("bridge.links[{}].discord_channel must be non-zero", i));
        }
        if link.telegram_chat == 0 {
            errors.push(format!("bridge.links[{}].telegram_chat must be non-zero", i));
        }
        if let Some(ref direction) = link.direction {
            if Direction::parse(direction).is_none() {
                errors.push(format!(
                    "bridge.links[{}].direction '{}' is invalid (use: bidirectional, to_telegram, to_discord)",
                    i, direction
                ));
            }
        }
    }

    errors
}
