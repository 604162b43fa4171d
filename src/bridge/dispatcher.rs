//! Relay dispatcher: routes inbound events to every linked destination.
//!
//! One inbound event is handled per call. The dispatcher takes a single
//! link table snapshot, transforms the message once and then relays it to
//! each matched link concurrently. Failures are logged per link and never
//! returned to the caller.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::links::BridgeLink;
use crate::bridge::manager::LinkTableManager;
use crate::bridge::sink::{DiscordSink, TelegramSink};
use crate::bridge::transform::{self, DiscordPost, TelegramPost};
use crate::common::error::{RelayError, RelayResult};
use crate::common::{DiscordInbound, InboundEvent, TelegramAttachment, TelegramInbound};

/// Outcome of relaying one inbound event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Links matched for the source channel.
    pub links: usize,
    /// Links where every part was sent.
    pub delivered: usize,
    /// Links where at least one part failed.
    pub failed: usize,
}

impl DispatchReport {
    fn from_outcomes(outcomes: &[bool]) -> Self {
        let delivered = outcomes.iter().filter(|ok| **ok).count();
        Self {
            links: outcomes.len(),
            delivered,
            failed: outcomes.len() - delivered,
        }
    }
}

/// Stateless relay core shared by both platform clients.
pub struct RelayDispatcher {
    links: Arc<LinkTableManager>,
    discord: Arc<dyn DiscordSink>,
    telegram: Arc<dyn TelegramSink>,
    cancel: CancellationToken,
}

impl RelayDispatcher {
    pub fn new(
        links: Arc<LinkTableManager>,
        discord: Arc<dyn DiscordSink>,
        telegram: Arc<dyn TelegramSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            links,
            discord,
            telegram,
            cancel,
        }
    }

    /// Relay an event from either platform.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchReport {
        match event {
            InboundEvent::Discord(msg) => self.on_discord_event(&msg).await,
            InboundEvent::Telegram(msg) => self.on_telegram_event(&msg).await,
        }
    }

    /// Relay a Telegram message to every linked Discord channel.
    pub async fn on_telegram_event(&self, msg: &TelegramInbound) -> DispatchReport {
        let table = self.links.snapshot();
        let links = table.from_telegram(msg.chat_id);
        if links.is_empty() {
            return DispatchReport::default();
        }

        if !msg.kind.is_relayed() {
            debug!(chat_id = msg.chat_id, kind = ?msg.kind, "Skipping unsupported Telegram message");
            return DispatchReport::default();
        }

        let Some(post) = transform::telegram_to_discord(msg) else {
            return DispatchReport::default();
        };

        let outcomes = join_all(
            links
                .iter()
                .map(|link| self.relay_to_discord(link, &post)),
        )
        .await;

        let report = DispatchReport::from_outcomes(&outcomes);
        info!(
            chat_id = msg.chat_id,
            sender = %msg.sender,
            links = report.links,
            failed = report.failed,
            "Telegram -> Discord"
        );
        report
    }

    /// Relay a Discord message to every linked Telegram chat.
    pub async fn on_discord_event(&self, msg: &DiscordInbound) -> DispatchReport {
        let table = self.links.snapshot();
        let links = table.from_discord(msg.channel_id);
        if links.is_empty() {
            return DispatchReport::default();
        }

        if !msg.has_content() {
            debug!(channel_id = msg.channel_id, "Skipping empty Discord message");
            return DispatchReport::default();
        }

        let Some(post) = transform::discord_to_telegram(msg) else {
            return DispatchReport::default();
        };

        let outcomes = join_all(
            links
                .iter()
                .map(|link| self.relay_to_telegram(link, &post)),
        )
        .await;

        let report = DispatchReport::from_outcomes(&outcomes);
        info!(
            channel_id = msg.channel_id,
            sender = %msg.sender,
            links = report.links,
            failed = report.failed,
            "Discord -> Telegram"
        );
        report
    }

    /// Send a post to one link's Discord channel: text first, then files in
    /// order. Returns whether every part went through.
    async fn relay_to_discord(&self, link: &BridgeLink, post: &DiscordPost) -> bool {
        let channel_id = link.discord_channel_id;

        let result = self.discord.send_text(channel_id, &post.text, &self.cancel).await;
        let mut ok = log_part(link, "text", result);

        for attachment in &post.files {
            if self.cancel.is_cancelled() {
                debug!(link = %link, "Shutdown requested, dropping remaining attachments");
                return false;
            }
            let result = self.forward_file(channel_id, attachment).await;
            ok &= log_part(link, "file", result);
        }

        ok
    }

    /// Download a Telegram file and upload it to a Discord channel.
    async fn forward_file(&self, channel_id: u64, attachment: &TelegramAttachment) -> RelayResult<()> {
        let file_id = attachment.file_id.as_str();
        debug!(file_id, "Downloading Telegram file");
        let file = self
            .telegram
            .download_file(file_id, attachment.kind, &self.cancel)
            .await?;

        // `file` is dropped (and deleted) on the error path too.
        self.discord.send_file(channel_id, &file, &self.cancel).await?;

        debug!(file_id, path = %file.path().display(), "Deleting Telegram file");
        if let Err(e) = file.close() {
            warn!(file_id, "Failed to delete temporary file: {}", e);
        }
        Ok(())
    }

    /// Send a post to one link's Telegram chat: text first, then photos.
    async fn relay_to_telegram(&self, link: &BridgeLink, post: &TelegramPost) -> bool {
        let chat_id = link.telegram_chat_id;

        let result = self.telegram.send_html(chat_id, &post.html, &self.cancel).await;
        let mut ok = log_part(link, "text", result);

        for url in &post.photo_urls {
            if self.cancel.is_cancelled() {
                debug!(link = %link, "Shutdown requested, dropping remaining attachments");
                return false;
            }
            let result = self.telegram.send_photo(chat_id, url, &self.cancel).await;
            ok &= log_part(link, "photo", result);
        }

        ok
    }
}

/// Log the outcome of one send. Returns `true` on success.
fn log_part(link: &BridgeLink, part: &str, result: RelayResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(RelayError::Cancelled) => {
            debug!(link = %link, part, "Send cancelled by shutdown");
            false
        }
        Err(e) => {
            warn!(link = %link, part, error = %e, "Failed to relay message part");
            false
        }
    }
}

/// Receive inbound events and dispatch each one on its own task.
///
/// Runs until `cancel` fires or every event sender is dropped, then waits
/// for in-flight dispatches (which observe the same token) to finish.
pub async fn run_event_pump(
    dispatcher: Arc<RelayDispatcher>,
    mut events: mpsc::UnboundedReceiver<InboundEvent>,
    cancel: CancellationToken,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown signal received, stopping event pump");
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    tasks.spawn(async move { dispatcher.dispatch(event).await });
                }
                None => {
                    debug!("Inbound event channel closed");
                    break;
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Dispatch task failed: {}", e);
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Dispatch task failed: {}", e);
        }
    }
    info!("Event pump ended");
}
