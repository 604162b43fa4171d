//! Telegram bot integration.
//!
//! Long-polls updates into the dispatcher and sends relayed posts through
//! the Bot API.

pub mod client;
pub mod outbound;

pub use client::TelegramBot;
pub use outbound::TelegramSender;
