//! Outbound Discord sends.

use std::sync::Arc;

use serenity::async_trait;
use serenity::builder::{CreateAttachment, CreateMessage};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{DiscordSink, DownloadedFile};
use crate::common::cancel::until_cancelled;
use crate::common::error::{Platform, RelayError, RelayResult};

/// Discord rejects message content longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// `DiscordSink` backed by serenity's REST client.
///
/// The client is replaced when the Discord bot is rebuilt with a new token.
pub struct DiscordSender {
    http: watch::Sender<Arc<Http>>,
}

impl DiscordSender {
    pub fn new(http: Arc<Http>) -> Self {
        let (http, _) = watch::channel(http);
        Self { http }
    }

    /// Route sends through `http` from now on. Sends already in flight
    /// finish on the previous client.
    pub fn replace_http(&self, http: Arc<Http>) {
        self.http.send_replace(http);
    }

    fn http(&self) -> Arc<Http> {
        self.http.borrow().clone()
    }
}

#[async_trait]
impl DiscordSink for DiscordSender {
    async fn send_text(
        &self,
        channel_id: u64,
        text: &str,
        cancel: &CancellationToken,
    ) -> RelayResult<()> {
        let channel = ChannelId::new(channel_id);
        let http = self.http();

        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            until_cancelled(cancel, async {
                channel
                    .say(&http, chunk)
                    .await
                    .map(|_| ())
                    .map_err(|e| RelayError::send_failed(Platform::Discord, channel_id, e))
            })
            .await?;
        }
        Ok(())
    }

    async fn send_file(
        &self,
        channel_id: u64,
        file: &DownloadedFile,
        cancel: &CancellationToken,
    ) -> RelayResult<()> {
        let channel = ChannelId::new(channel_id);
        let http = self.http();

        until_cancelled(cancel, async {
            let mut attachment = CreateAttachment::path(file.path())
                .await
                .map_err(|e| RelayError::send_failed(Platform::Discord, channel_id, e))?;
            attachment.filename = file.file_name().to_string();

            debug!(
                channel_id,
                file_name = %attachment.filename,
                bytes = attachment.data.len(),
                "Uploading file to Discord"
            );

            channel
                .send_files(&http, [attachment], CreateMessage::new())
                .await
                .map(|_| ())
                .map_err(|e| RelayError::send_failed(Platform::Discord, channel_id, e))
        })
        .await
    }
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Prefers breaking at the last newline, then the last space, inside the
/// limit. Never splits inside a character.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_chars {
            chunks.push(remaining.to_string());
            break;
        }

        // Byte offset just past the first `max_chars` characters.
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..limit];

        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0);

        match split_at {
            Some(i) => {
                // A CRLF break leaves no stray `\r` on the chunk.
                chunks.push(remaining[..i].trim_end_matches('\r').to_string());
                // Drop the separator itself.
                remaining = &remaining[i + 1..];
            }
            None => {
                chunks.push(window.to_string());
                remaining = &remaining[limit..];
            }
        }
    }

    chunks
}
