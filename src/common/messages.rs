//! Canonical message types for bridge communication.
//!
//! Platform clients convert their SDK messages into these types before
//! handing them to the dispatcher, so the relay core never sees serenity
//! or teloxide structures.

/// Kind of a Telegram message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramEventKind {
    Text,
    Photo,
    Sticker,
    MemberJoined,
    MemberLeft,
    /// Anything the bridge does not relay (documents, polls, edits...).
    Other(String),
}

impl TelegramEventKind {
    /// Whether messages of this kind are relayed to Discord at all.
    pub fn is_relayed(&self) -> bool {
        !matches!(self, TelegramEventKind::Other(_))
    }
}

/// Kind of a Telegram file reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramFileKind {
    Photo,
    Sticker,
}

/// A file attached to a Telegram message, referenced by its file ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramAttachment {
    pub file_id: String,
    pub kind: TelegramFileKind,
}

/// Message received from a Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramInbound {
    /// Telegram chat ID.
    pub chat_id: i64,
    /// Sender's display label.
    pub sender: String,
    pub kind: TelegramEventKind,
    /// Message text, or the caption for media posts.
    pub text: Option<String>,
    /// Text of the message this one replies to.
    pub reply_text: Option<String>,
    pub attachments: Vec<TelegramAttachment>,
}

/// A file attached to a Discord message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordAttachment {
    pub url: String,
    pub proxy_url: Option<String>,
}

impl DiscordAttachment {
    /// URL to forward: the media proxy when Discord provides one.
    pub fn best_url(&self) -> &str {
        match self.proxy_url.as_deref() {
            Some(proxy) if !proxy.trim().is_empty() => proxy,
            _ => &self.url,
        }
    }
}

/// Message received from a Discord channel.
#[derive(Debug, Clone)]
pub struct DiscordInbound {
    /// Discord channel ID.
    pub channel_id: u64,
    /// Sender's display label.
    pub sender: String,
    pub text: String,
    pub attachments: Vec<DiscordAttachment>,
}

impl DiscordInbound {
    /// Whether the message carries anything worth relaying.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || !self.attachments.is_empty()
    }
}

/// Inbound event delivered by either platform client.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Discord(DiscordInbound),
    Telegram(TelegramInbound),
}
