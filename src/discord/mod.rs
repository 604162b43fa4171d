//! Discord bot integration.
//!
//! This module provides the Discord side of the bridge: the gateway client
//! feeding inbound messages to the dispatcher and the REST sender used for
//! relayed posts.

pub mod client;
pub mod outbound;

// Re-export main types for external use
pub use client::DiscordBot;
pub use outbound::DiscordSender;
