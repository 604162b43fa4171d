//! Telegram long-polling client.
//!
//! Polls `getUpdates`, converts chat messages into `TelegramInbound`
//! events and backs off after polling errors.

use std::time::Duration;

use backon::BackoffBuilder;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, MediaKind, MessageKind, UpdateKind, User};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::common::{
    InboundEvent, TelegramAttachment, TelegramEventKind, TelegramFileKind, TelegramInbound,
};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff between failed polls.
fn poll_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(MAX_BACKOFF)
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build()
}

/// The Telegram side of the bridge.
pub struct TelegramBot {
    bot: Bot,
    poll_timeout_secs: u32,
}

impl TelegramBot {
    /// Build the bot, verify the token and clear any webhook so long polling
    /// works.
    pub async fn connect(token: &str, poll_timeout_secs: u32) -> anyhow::Result<Self> {
        // The HTTP timeout must outlast the long-poll timeout.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(poll_timeout_secs) + 15))
            .build()?;
        let bot = Bot::with_client(token, client);

        let me = bot.get_me().await?;
        bot.delete_webhook().send().await?;

        info!(username = ?me.username, "Telegram bot connected (webhook cleared)");

        Ok(Self {
            bot,
            poll_timeout_secs,
        })
    }

    /// Bot handle for outbound sends.
    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Poll for updates until `cancel` fires.
    pub async fn run(self, events_tx: mpsc::UnboundedSender<InboundEvent>, cancel: CancellationToken) {
        let mut offset: i32 = 0;
        let mut backoff = poll_backoff();

        info!("Starting Telegram polling loop");

        loop {
            let request = self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(self.poll_timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    backoff = poll_backoff();
                    if !updates.is_empty() {
                        debug!(count = updates.len(), "Got Telegram updates");
                    }

                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(message) => {
                                let inbound = received(&message);
                                if let Err(error) = events_tx.send(InboundEvent::Telegram(inbound)) {
                                    warn!("Failed to process telegram event: {}", error);
                                }
                            }
                            other => debug!("Ignoring non-message update: {:?}", other),
                        }
                    }
                }
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    error!("Telegram polling stopped: another instance is running with this token");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                    warn!(
                        "Telegram polling failed: {}. Retrying in {:.1}s...",
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Telegram polling stopped");
    }
}

/// Convert a received message, tracing it.
fn received(message: &Message) -> TelegramInbound {
    let inbound = telegram_inbound(message);
    trace!(
        message_id = message.id.0,
        chat_id = inbound.chat_id,
        kind = ?inbound.kind,
        sender = %inbound.sender,
        text = ?inbound.text,
        attachments = inbound.attachments.len(),
        "Telegram message received"
    );
    inbound
}

/// Convert a teloxide message into the bridge's inbound type.
pub fn telegram_inbound(message: &Message) -> TelegramInbound {
    let mut sender = message.from.as_ref().map(user_label);
    let mut attachments = Vec::new();

    let kind = match &message.kind {
        MessageKind::NewChatMembers(joined) => {
            if !joined.new_chat_members.is_empty() {
                let labels: Vec<String> = joined.new_chat_members.iter().map(user_label).collect();
                sender = Some(labels.join(", "));
            }
            TelegramEventKind::MemberJoined
        }
        MessageKind::LeftChatMember(left) => {
            sender = Some(user_label(&left.left_chat_member));
            TelegramEventKind::MemberLeft
        }
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(_) => TelegramEventKind::Text,
            MediaKind::Photo(photo) => {
                // Sizes are ordered smallest first.
                if let Some(largest) = photo.photo.last() {
                    attachments.push(TelegramAttachment {
                        file_id: largest.file.id.clone(),
                        kind: TelegramFileKind::Photo,
                    });
                }
                TelegramEventKind::Photo
            }
            MediaKind::Sticker(sticker) => {
                attachments.push(TelegramAttachment {
                    file_id: sticker.sticker.file.id.clone(),
                    kind: TelegramFileKind::Sticker,
                });
                TelegramEventKind::Sticker
            }
            other => TelegramEventKind::Other(media_label(other).to_string()),
        },
        _ => TelegramEventKind::Other("service".to_string()),
    };

    TelegramInbound {
        chat_id: message.chat.id.0,
        sender: sender.unwrap_or_else(|| "unknown".to_string()),
        kind,
        text: message.text().or_else(|| message.caption()).map(String::from),
        reply_text: message
            .reply_to_message()
            .and_then(|reply| reply.text().or_else(|| reply.caption()))
            .map(String::from),
        attachments,
    }
}

/// Display label for a Telegram user: username, else first name.
fn user_label(user: &User) -> String {
    user.username
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&user.first_name)
        .to_string()
}

fn media_label(media: &MediaKind) -> &'static str {
    match media {
        MediaKind::Animation(_) => "animation",
        MediaKind::Audio(_) => "audio",
        MediaKind::Contact(_) => "contact",
        MediaKind::Document(_) => "document",
        MediaKind::Location(_) => "location",
        MediaKind::Poll(_) => "poll",
        MediaKind::Venue(_) => "venue",
        MediaKind::Video(_) => "video",
        MediaKind::VideoNote(_) => "video_note",
        MediaKind::Voice(_) => "voice",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        serde_json::from_value(value).expect("deserialize telegram message")
    }

    fn chat_message(extra: serde_json::Value) -> serde_json::Value {
        let mut base = json!({
            "message_id": 10,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": {
                "id": 1001,
                "is_bot": false,
                "first_name": "Alice",
                "username": "alice"
            }
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        base
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_received_message_is_traced() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let inbound = tracing::subscriber::with_default(subscriber, || {
            received(&message(chat_message(json!({ "text": "hello" }))))
        });
        assert_eq!(inbound.text.as_deref(), Some("hello"));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("TRACE"));
        assert!(output.contains("Telegram message received"));
        assert!(output.contains("message_id=10"));
        assert!(output.contains("chat_id=42"));
        assert!(output.contains("sender=alice"));
        assert!(output.contains("text=Some(\"hello\")"));
    }

    #[test]
    fn test_text_message() {
        let inbound = telegram_inbound(&message(chat_message(json!({ "text": "hello" }))));

        assert_eq!(inbound.chat_id, 42);
        assert_eq!(inbound.sender, "alice");
        assert_eq!(inbound.kind, TelegramEventKind::Text);
        assert_eq!(inbound.text.as_deref(), Some("hello"));
        assert_eq!(inbound.reply_text, None);
        assert!(inbound.attachments.is_empty());
    }

    #[test]
    fn test_sender_falls_back_to_first_name() {
        let mut value = chat_message(json!({ "text": "hi" }));
        value["from"] = json!({ "id": 7, "is_bot": false, "first_name": "Bob" });

        assert_eq!(telegram_inbound(&message(value)).sender, "Bob");
    }

    #[test]
    fn test_reply_text_is_captured() {
        let reply = chat_message(json!({ "text": "original" }));
        let inbound = telegram_inbound(&message(chat_message(json!({
            "message_id": 11,
            "text": "answer",
            "reply_to_message": reply
        }))));

        assert_eq!(inbound.text.as_deref(), Some("answer"));
        assert_eq!(inbound.reply_text.as_deref(), Some("original"));
    }

    #[test]
    fn test_photo_uses_largest_size_and_caption() {
        let inbound = telegram_inbound(&message(chat_message(json!({
            "caption": "look",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l", "width": 1280, "height": 1280 }
            ]
        }))));

        assert_eq!(inbound.kind, TelegramEventKind::Photo);
        assert_eq!(inbound.text.as_deref(), Some("look"));
        assert_eq!(
            inbound.attachments,
            vec![TelegramAttachment {
                file_id: "large".to_string(),
                kind: TelegramFileKind::Photo,
            }]
        );
    }

    #[test]
    fn test_member_joined_uses_new_member() {
        let inbound = telegram_inbound(&message(chat_message(json!({
            "new_chat_members": [
                { "id": 5, "is_bot": false, "first_name": "Carol", "username": "carol" }
            ]
        }))));

        assert_eq!(inbound.kind, TelegramEventKind::MemberJoined);
        assert_eq!(inbound.sender, "carol");
    }

    #[test]
    fn test_several_members_joined() {
        let inbound = telegram_inbound(&message(chat_message(json!({
            "new_chat_members": [
                { "id": 5, "is_bot": false, "first_name": "Carol", "username": "carol" },
                { "id": 8, "is_bot": false, "first_name": "Erin" }
            ]
        }))));

        assert_eq!(inbound.kind, TelegramEventKind::MemberJoined);
        assert_eq!(inbound.sender, "carol, Erin");
    }

    #[test]
    fn test_member_left() {
        let inbound = telegram_inbound(&message(chat_message(json!({
            "left_chat_member": { "id": 6, "is_bot": false, "first_name": "Dave" }
        }))));

        assert_eq!(inbound.kind, TelegramEventKind::MemberLeft);
        assert_eq!(inbound.sender, "Dave");
    }

    #[test]
    fn test_unsupported_media_is_other() {
        let inbound = telegram_inbound(&message(chat_message(json!({
            "location": { "latitude": 1.0, "longitude": 2.0 }
        }))));

        assert_eq!(inbound.kind, TelegramEventKind::Other("location".to_string()));
        assert!(!inbound.kind.is_relayed());
    }
}
