//! Outbound Telegram sends and file downloads.

use serenity::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{DownloadedFile, TelegramSink};
use crate::common::cancel::until_cancelled;
use crate::common::error::{Platform, RelayError, RelayResult};
use crate::common::TelegramFileKind;

/// `TelegramSink` backed by a teloxide `Bot`.
///
/// The bot is replaced when the Telegram client is rebuilt with a new token.
pub struct TelegramSender {
    bot: watch::Sender<Bot>,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        let (bot, _) = watch::channel(bot);
        Self { bot }
    }

    /// Route sends through `bot` from now on.
    pub fn replace_bot(&self, bot: Bot) {
        self.bot.send_replace(bot);
    }

    fn bot(&self) -> Bot {
        self.bot.borrow().clone()
    }

    async fn fetch(&self, file_id: &str, kind: TelegramFileKind) -> RelayResult<DownloadedFile> {
        let bot = self.bot();
        let fetch_error = |e: &dyn std::fmt::Display| RelayError::AttachmentFetch {
            file_id: file_id.to_string(),
            message: e.to_string(),
        };

        let file = bot.get_file(file_id).await.map_err(|e| fetch_error(&e))?;

        let temp = tempfile::Builder::new()
            .prefix("relaycord-")
            .tempfile()?
            .into_temp_path();

        let mut dst = tokio::fs::File::create(&temp).await?;
        bot.download_file(&file.path, &mut dst)
            .await
            .map_err(|e| fetch_error(&e))?;
        dst.flush().await?;

        let file_name = download_file_name(&file.path, kind);
        debug!(file_id, file_name = %file_name, path = %temp.display(), "Downloaded Telegram file");

        Ok(DownloadedFile::new(temp, file_name))
    }
}

#[async_trait]
impl TelegramSink for TelegramSender {
    async fn send_html(&self, chat_id: i64, html: &str, cancel: &CancellationToken) -> RelayResult<()> {
        let bot = self.bot();
        until_cancelled(cancel, async {
            bot.send_message(ChatId(chat_id), html)
                .parse_mode(ParseMode::Html)
                .await
                .map(|_| ())
                .map_err(|e| RelayError::send_failed(Platform::Telegram, chat_id, e))
        })
        .await
    }

    async fn send_photo(&self, chat_id: i64, url: &str, cancel: &CancellationToken) -> RelayResult<()> {
        let url = url.parse::<reqwest::Url>().map_err(|e| {
            RelayError::send_failed(Platform::Telegram, chat_id, format!("invalid url {}: {}", url, e))
        })?;

        let bot = self.bot();
        until_cancelled(cancel, async {
            bot.send_photo(ChatId(chat_id), InputFile::url(url))
                .await
                .map(|_| ())
                .map_err(|e| RelayError::send_failed(Platform::Telegram, chat_id, e))
        })
        .await
    }

    async fn download_file(
        &self,
        file_id: &str,
        kind: TelegramFileKind,
        cancel: &CancellationToken,
    ) -> RelayResult<DownloadedFile> {
        // A partial download is deleted when the future is dropped.
        until_cancelled(cancel, self.fetch(file_id, kind)).await
    }
}

/// Name to upload a downloaded file under.
///
/// Uses the last segment of Telegram's storage path (`photos/file_3.jpg`),
/// falling back to a name derived from the file kind.
pub fn download_file_name(storage_path: &str, kind: TelegramFileKind) -> String {
    match storage_path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match kind {
            TelegramFileKind::Photo => "photo.jpg",
            TelegramFileKind::Sticker => "sticker.webp",
        }
        .to_string(),
    }
}
