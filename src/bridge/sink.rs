//! Outbound seams between the relay core and the platform clients.

use std::path::Path;

use serenity::async_trait;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;

use crate::common::error::RelayResult;
use crate::common::TelegramFileKind;

/// A Telegram file downloaded to local storage.
///
/// The file is deleted when this value is dropped, so whichever send
/// owns it cleans up on every exit path.
#[derive(Debug)]
pub struct DownloadedFile {
    path: TempPath,
    file_name: String,
}

impl DownloadedFile {
    pub fn new(path: TempPath, file_name: impl Into<String>) -> Self {
        Self {
            path,
            file_name: file_name.into(),
        }
    }

    /// Local path of the downloaded content.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name to present to the receiving platform.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Delete the file now, reporting any error.
    pub fn close(self) -> std::io::Result<()> {
        self.path.close()
    }
}

/// Outbound operations on Discord.
#[async_trait]
pub trait DiscordSink: Send + Sync {
    /// Post markdown text to a channel.
    async fn send_text(
        &self,
        channel_id: u64,
        text: &str,
        cancel: &CancellationToken,
    ) -> RelayResult<()>;

    /// Upload a local file to a channel.
    async fn send_file(
        &self,
        channel_id: u64,
        file: &DownloadedFile,
        cancel: &CancellationToken,
    ) -> RelayResult<()>;
}

/// Outbound operations on Telegram.
#[async_trait]
pub trait TelegramSink: Send + Sync {
    /// Post HTML text to a chat.
    async fn send_html(&self, chat_id: i64, html: &str, cancel: &CancellationToken)
        -> RelayResult<()>;

    /// Post a photo Telegram fetches from `url`.
    async fn send_photo(&self, chat_id: i64, url: &str, cancel: &CancellationToken)
        -> RelayResult<()>;

    /// Download a file from Telegram's file storage into a temporary file.
    async fn download_file(
        &self,
        file_id: &str,
        kind: TelegramFileKind,
        cancel: &CancellationToken,
    ) -> RelayResult<DownloadedFile>;
}
