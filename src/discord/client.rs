//! Discord gateway client.
//!
//! Runs the serenity client, converts channel messages into
//! `DiscordInbound` events and reconnects with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serenity::async_trait;
use serenity::http::{Http, HttpBuilder};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::common::{DiscordAttachment, DiscordInbound, InboundEvent};

const MAX_BACKOFF: Duration = Duration::from_secs(300);

struct RelayEventHandler {
    events_tx: mpsc::UnboundedSender<InboundEvent>,
    relay_bots: bool,
}

#[async_trait]
impl EventHandler for RelayEventHandler {
    async fn ready(&self, _context: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} ({} guilds)",
            ready.user.name,
            ready.guilds.len()
        );
    }

    async fn message(&self, context: Context, message: Message) {
        trace!(
            message_id = %message.id,
            channel_id = %message.channel_id,
            kind = ?message.kind,
            sender = %message.author.name,
            text = %message.content,
            attachments = message.attachments.len(),
            "Discord message received"
        );

        let own_id = context.cache.current_user().id;
        if message.author.id == own_id {
            return;
        }
        if message.author.bot && !self.relay_bots {
            debug!(author = %message.author.name, "Ignoring bot message");
            return;
        }

        let inbound = discord_inbound(&message);
        if !inbound.has_content() {
            debug!(channel_id = inbound.channel_id, "Ignoring empty Discord message");
            return;
        }

        if let Err(error) = self.events_tx.send(InboundEvent::Discord(inbound)) {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

/// Convert a serenity message into the bridge's inbound type.
fn discord_inbound(message: &Message) -> DiscordInbound {
    let nick = message.member.as_ref().and_then(|m| m.nick.as_deref());
    let sender = sender_label(
        nick,
        message.author.global_name.as_deref(),
        &message.author.name,
        message.author.discriminator.map(|d| d.get()),
    );

    DiscordInbound {
        channel_id: message.channel_id.get(),
        sender,
        text: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|a| DiscordAttachment {
                url: a.url.clone(),
                proxy_url: Some(a.proxy_url.clone()),
            })
            .collect(),
    }
}

/// Display label for a Discord author.
///
/// Uses the guild nickname, then the global display name, then the user
/// name. Legacy accounts keep their `#discriminator` suffix.
pub fn sender_label(
    nick: Option<&str>,
    global_name: Option<&str>,
    username: &str,
    discriminator: Option<u16>,
) -> String {
    let name = [nick, global_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|n| !n.is_empty())
        .unwrap_or(username);

    match discriminator {
        Some(d) => format!("{}#{:04}", name, d),
        None => name.to_string(),
    }
}

async fn build_client(
    token: &str,
    relay_bots: bool,
    events_tx: mpsc::UnboundedSender<InboundEvent>,
) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS;

    let http = HttpBuilder::new(token).client(http_client()?).build();

    let handler = RelayEventHandler {
        events_tx,
        relay_bots,
    };
    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(handler)
        .await?;
    Ok(client)
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// Exponential backoff for Discord reconnection.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(MAX_BACKOFF)
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

/// The Discord side of the bridge.
pub struct DiscordBot {
    client: Option<Client>,
    http: Arc<Http>,
    token: String,
    relay_bots: bool,
    events_tx: mpsc::UnboundedSender<InboundEvent>,
}

impl DiscordBot {
    /// Build the client. Inbound messages are sent to `events_tx`.
    pub async fn build(
        token: String,
        relay_bots: bool,
        events_tx: mpsc::UnboundedSender<InboundEvent>,
    ) -> anyhow::Result<Self> {
        let client = build_client(&token, relay_bots, events_tx.clone()).await?;
        let http = client.http.clone();
        Ok(Self {
            client: Some(client),
            http,
            token,
            relay_bots,
            events_tx,
        })
    }

    /// REST client for outbound sends.
    pub fn http(&self) -> Arc<Http> {
        self.http.clone()
    }

    /// Run the gateway connection until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());

        tokio::select! {
            _ = self.run_connection() => {},
            _ = cancel.cancelled() => {
                if let Some(manager) = shard_manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            }
        }
        info!("Discord task ended");
    }

    async fn run_connection(&mut self) {
        let mut backoff = discord_backoff();

        loop {
            info!("Connecting to Discord...");

            let mut client = match self.client.take() {
                Some(client) => client,
                None => match build_client(&self.token, self.relay_bots, self.events_tx.clone()).await {
                    Ok(client) => {
                        backoff = discord_backoff();
                        client
                    }
                    Err(e) => {
                        error!("Failed to rebuild Discord client: {}", e);
                        let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                        warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                        sleep(delay).await;
                        continue;
                    }
                },
            };

            match client.start().await {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    break;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
