//! Error types for the application.

use std::fmt;

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    /// A bridge link cannot be built into a link table.
    #[error("Invalid bridge link #{index}: {reason}")]
    InvalidLink { index: usize, reason: String },
}

/// Platform a relay operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Discord,
    Telegram,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Discord => f.write_str("discord"),
            Platform::Telegram => f.write_str("telegram"),
        }
    }
}

/// Errors raised by a single outward relay operation.
///
/// These never cross the dispatcher boundary: every variant is logged
/// against the link it belongs to and then dropped.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to send to {platform} {target}: {message}")]
    SendFailed {
        platform: Platform,
        target: String,
        message: String,
    },

    #[error("Failed to fetch Telegram file {file_id}: {message}")]
    AttachmentFetch { file_id: String, message: String },

    #[error("Operation cancelled by shutdown")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn send_failed(platform: Platform, target: impl fmt::Display, error: impl fmt::Display) -> Self {
        RelayError::SendFailed {
            platform,
            target: target.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_failed_message() {
        let err = RelayError::send_failed(Platform::Telegram, -100123, "Bad Request");
        assert_eq!(
            err.to_string(),
            "Failed to send to telegram -100123: Bad Request"
        );
    }

    #[test]
    fn test_invalid_link_message() {
        let err = ConfigError::InvalidLink {
            index: 2,
            reason: "discord_channel must be non-zero".to_string(),
        };
        assert!(err.to_string().contains("#2"));
        assert!(err.to_string().contains("discord_channel"));
    }
}
