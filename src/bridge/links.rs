//! Bridge links and the per-generation link table.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::common::error::ConfigError;
use crate::config::types::LinkConfig;

/// Direction of message flow for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Discord to Telegram only.
    ToTelegram,
    /// Telegram to Discord only.
    ToDiscord,
    /// Both ways.
    #[default]
    Bidirectional,
}

impl Direction {
    /// Parse a direction from its config string. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "to_telegram" | "discord_to_telegram" => Some(Direction::ToTelegram),
            "to_discord" | "telegram_to_discord" => Some(Direction::ToDiscord),
            "bidirectional" | "both" => Some(Direction::Bidirectional),
            _ => None,
        }
    }

    /// Check if this direction allows Discord -> Telegram messages.
    pub fn allows_discord_to_telegram(&self) -> bool {
        matches!(self, Direction::ToTelegram | Direction::Bidirectional)
    }

    /// Check if this direction allows Telegram -> Discord messages.
    pub fn allows_telegram_to_discord(&self) -> bool {
        matches!(self, Direction::ToDiscord | Direction::Bidirectional)
    }
}

/// A configured relay rule between one Discord channel and one Telegram chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeLink {
    pub direction: Direction,
    pub discord_channel_id: u64,
    pub telegram_chat_id: i64,
}

impl fmt::Display for BridgeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::ToTelegram => "->",
            Direction::ToDiscord => "<-",
            Direction::Bidirectional => "<->",
        };
        write!(
            f,
            "discord:{} {} telegram:{}",
            self.discord_channel_id, arrow, self.telegram_chat_id
        )
    }
}

/// Convert configured links into bridge links.
///
/// Only the direction is interpreted here; identifier checks happen in
/// [`LinkTable::build`].
pub fn links_from_config(configs: &[LinkConfig]) -> Result<Vec<BridgeLink>, ConfigError> {
    configs
        .iter()
        .enumerate()
        .map(|(index, config)| {
            let direction = match config.direction.as_deref() {
                None => Direction::default(),
                Some(raw) => Direction::parse(raw).ok_or_else(|| ConfigError::InvalidLink {
                    index,
                    reason: format!(
                        "direction '{}' is invalid (use: bidirectional, to_telegram, to_discord)",
                        raw
                    ),
                })?,
            };
            Ok(BridgeLink {
                direction,
                discord_channel_id: config.discord_channel,
                telegram_chat_id: config.telegram_chat,
            })
        })
        .collect()
}

/// Immutable index over one generation of bridge links.
#[derive(Debug, Default)]
pub struct LinkTable {
    /// Index: Discord channel -> links relaying Discord -> Telegram.
    from_discord: HashMap<u64, Vec<BridgeLink>>,
    /// Index: Telegram chat -> links relaying Telegram -> Discord.
    from_telegram: HashMap<i64, Vec<BridgeLink>>,
    len: usize,
}

impl LinkTable {
    /// Build a table from links in configuration order.
    ///
    /// Fails if any link has a zero identifier on either side; nothing is
    /// built in that case.
    pub fn build(links: &[BridgeLink]) -> Result<Self, ConfigError> {
        let mut from_discord: HashMap<u64, Vec<BridgeLink>> = HashMap::new();
        let mut from_telegram: HashMap<i64, Vec<BridgeLink>> = HashMap::new();

        for (index, link) in links.iter().enumerate() {
            if link.discord_channel_id == 0 {
                return Err(ConfigError::InvalidLink {
                    index,
                    reason: "discord_channel must be non-zero".to_string(),
                });
            }
            if link.telegram_chat_id == 0 {
                return Err(ConfigError::InvalidLink {
                    index,
                    reason: "telegram_chat must be non-zero".to_string(),
                });
            }

            if link.direction.allows_discord_to_telegram() {
                from_discord
                    .entry(link.discord_channel_id)
                    .or_default()
                    .push(*link);
            }
            if link.direction.allows_telegram_to_discord() {
                from_telegram
                    .entry(link.telegram_chat_id)
                    .or_default()
                    .push(*link);
            }
        }

        debug!(
            links = links.len(),
            discord_sources = from_discord.len(),
            telegram_sources = from_telegram.len(),
            "Built link table"
        );

        Ok(Self {
            from_discord,
            from_telegram,
            len: links.len(),
        })
    }

    /// Links that relay messages from the given Discord channel.
    pub fn from_discord(&self, channel_id: u64) -> &[BridgeLink] {
        self.from_discord
            .get(&channel_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Links that relay messages from the given Telegram chat.
    pub fn from_telegram(&self, chat_id: i64) -> &[BridgeLink] {
        self.from_telegram
            .get(&chat_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of links the table was built from.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(direction: Direction, discord: u64, telegram: i64) -> BridgeLink {
        BridgeLink {
            direction,
            discord_channel_id: discord,
            telegram_chat_id: telegram,
        }
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!(Direction::parse("to_telegram"), Some(Direction::ToTelegram));
        assert_eq!(Direction::parse("TO_DISCORD"), Some(Direction::ToDiscord));
        assert_eq!(Direction::parse("both"), Some(Direction::Bidirectional));
        assert_eq!(
            Direction::parse("bidirectional"),
            Some(Direction::Bidirectional)
        );
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn test_direction_partitioning() {
        let links = vec![
            link(Direction::Bidirectional, 1, -10),
            link(Direction::ToTelegram, 2, -20),
            link(Direction::ToDiscord, 3, -30),
        ];
        let table = LinkTable::build(&links).unwrap();

        // Bidirectional appears in both indices
        assert_eq!(table.from_discord(1), &[links[0]]);
        assert_eq!(table.from_telegram(-10), &[links[0]]);

        // ToTelegram only in the Discord-keyed index
        assert_eq!(table.from_discord(2), &[links[1]]);
        assert!(table.from_telegram(-20).is_empty());

        // ToDiscord only in the Telegram-keyed index
        assert!(table.from_discord(3).is_empty());
        assert_eq!(table.from_telegram(-30), &[links[2]]);
    }

    #[test]
    fn test_zero_discord_id_rejected() {
        let links = vec![
            link(Direction::Bidirectional, 1, -10),
            link(Direction::Bidirectional, 0, -20),
        ];
        let err = LinkTable::build(&links).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLink { index: 1, .. }));
    }

    #[test]
    fn test_zero_telegram_id_rejected() {
        let links = vec![link(Direction::ToTelegram, 1, 0)];
        let err = LinkTable::build(&links).unwrap_err();
        assert!(err.to_string().contains("telegram_chat"));
    }

    #[test]
    fn test_unknown_channel_is_empty() {
        let table = LinkTable::build(&[link(Direction::Bidirectional, 1, -10)]).unwrap();
        assert!(table.from_discord(999).is_empty());
        assert!(table.from_telegram(-999).is_empty());
        assert!(LinkTable::default().from_discord(1).is_empty());
    }

    #[test]
    fn test_fan_out_keeps_config_order() {
        let links = vec![
            link(Direction::Bidirectional, 1, -10),
            link(Direction::Bidirectional, 1, -20),
            link(Direction::ToTelegram, 1, -10),
        ];
        let table = LinkTable::build(&links).unwrap();

        // Not deduplicated, insertion order preserved
        assert_eq!(table.from_discord(1), links.as_slice());
        assert_eq!(table.from_telegram(-10), &[links[0]]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_fan_in() {
        let links = vec![
            link(Direction::ToDiscord, 1, -10),
            link(Direction::ToDiscord, 1, -20),
        ];
        let table = LinkTable::build(&links).unwrap();
        assert_eq!(table.from_telegram(-10)[0].discord_channel_id, 1);
        assert_eq!(table.from_telegram(-20)[0].discord_channel_id, 1);
    }

    #[test]
    fn test_links_from_config() {
        let configs = vec![
            LinkConfig {
                direction: None,
                discord_channel: 1,
                telegram_chat: -10,
            },
            LinkConfig {
                direction: Some("to_discord".to_string()),
                discord_channel: 2,
                telegram_chat: -20,
            },
        ];
        let links = links_from_config(&configs).unwrap();
        assert_eq!(links[0].direction, Direction::Bidirectional);
        assert_eq!(links[1].direction, Direction::ToDiscord);
        assert_eq!(links[1].telegram_chat_id, -20);
    }

    #[test]
    fn test_links_from_config_bad_direction() {
        let configs = vec![LinkConfig {
            direction: Some("up".to_string()),
            discord_channel: 1,
            telegram_chat: -10,
        }];
        let err = links_from_config(&configs).unwrap_err();
        assert!(err.to_string().contains("direction 'up'"));
    }

    #[test]
    fn test_display() {
        let l = link(Direction::ToTelegram, 5, -6);
        assert_eq!(l.to_string(), "discord:5 -> telegram:-6");
    }
}
