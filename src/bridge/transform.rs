//! Message transformation between platforms.
//!
//! Pure functions: no I/O, no configuration. Telegram messages become
//! Discord markdown, Discord messages become Telegram HTML.

use crate::common::{DiscordInbound, TelegramAttachment, TelegramEventKind, TelegramInbound};

/// A Telegram message rendered for Discord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordPost {
    /// Discord markdown.
    pub text: String,
    /// Telegram files to download and upload, in order.
    pub files: Vec<TelegramAttachment>,
}

/// A Discord message rendered for Telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramPost {
    /// Telegram HTML.
    pub html: String,
    /// Attachment URLs Telegram fetches by itself, in order.
    pub photo_urls: Vec<String>,
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Transform a Telegram message for Discord.
///
/// Returns `None` for kinds the bridge does not relay.
pub fn telegram_to_discord(msg: &TelegramInbound) -> Option<DiscordPost> {
    match msg.kind {
        TelegramEventKind::MemberJoined => Some(DiscordPost {
            text: format!("***{}*** *has joined the chat.", msg.sender),
            files: Vec::new(),
        }),
        TelegramEventKind::MemberLeft => Some(DiscordPost {
            text: format!("***{}*** *has left the chat.", msg.sender),
            files: Vec::new(),
        }),
        TelegramEventKind::Text | TelegramEventKind::Photo | TelegramEventKind::Sticker => {
            let mut text = format!("***{}*** *sent*:\r\n", msg.sender);
            if let Some(reply) = non_blank(msg.reply_text.as_deref()) {
                text.push_str("> ");
                text.push_str(reply);
                text.push_str("\r\n");
            }
            if let Some(body) = non_blank(msg.text.as_deref()) {
                text.push_str(body);
            }

            Some(DiscordPost {
                text,
                files: msg.attachments.clone(),
            })
        }
        TelegramEventKind::Other(_) => None,
    }
}

/// Transform a Discord message for Telegram.
///
/// Returns `None` when there is neither text nor an attachment.
pub fn discord_to_telegram(msg: &DiscordInbound) -> Option<TelegramPost> {
    if !msg.has_content() {
        return None;
    }

    let mut html = format!("<i><b>{}</b> sent</i>:", escape_html(&msg.sender));
    if let Some(content) = non_blank(Some(msg.text.as_str())) {
        html.push_str("\r\n");
        html.push_str(&escape_html(content));
    }

    Some(TelegramPost {
        html,
        photo_urls: msg
            .attachments
            .iter()
            .map(|a| a.best_url().to_string())
            .collect(),
    })
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
