//! Common utilities and types shared across the application.

pub mod cancel;
pub mod error;
pub mod messages;

pub use messages::{
    DiscordAttachment, DiscordInbound, InboundEvent, TelegramAttachment, TelegramEventKind,
    TelegramFileKind, TelegramInbound,
};
