//! Platform client lifecycle.
//!
//! Runs the Discord and Telegram clients as child tasks of the bridge and
//! rebuilds a client in place when its settings change in the config file.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::InboundEvent;
use crate::config::watcher::ClientRestart;
use crate::discord::{DiscordBot, DiscordSender};
use crate::telegram::{TelegramBot, TelegramSender};

/// A client task with its own cancellation token.
struct RunningClient {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningClient {
    fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(cancel.clone()));
        Self { name, cancel, handle }
    }

    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("{} client task failed: {}", self.name, e);
        }
    }
}

/// Swap `current` for a freshly built client.
///
/// The new client is only started after the old one has stopped. A client
/// that failed to build leaves `current` running.
async fn restart<T, F, Fut>(
    current: RunningClient,
    built: anyhow::Result<T>,
    parent: &CancellationToken,
    start: F,
) -> RunningClient
where
    F: FnOnce(T, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let next = match built {
        Ok(next) => next,
        Err(e) => {
            error!(
                "Failed to rebuild {} client, keeping the current one: {}",
                current.name, e
            );
            return current;
        }
    };

    let name = current.name;
    current.stop().await;
    info!("{} client restarted", name);
    RunningClient::spawn(name, parent, |cancel| start(next, cancel))
}

enum Step {
    Shutdown,
    DiscordEnded,
    TelegramEnded,
    Restart(ClientRestart),
}

/// Owns both platform clients for the lifetime of the bridge.
pub struct ClientSupervisor {
    discord_sender: Arc<DiscordSender>,
    telegram_sender: Arc<TelegramSender>,
    events_tx: mpsc::UnboundedSender<InboundEvent>,
    cancel: CancellationToken,
}

impl ClientSupervisor {
    pub fn new(
        discord_sender: Arc<DiscordSender>,
        telegram_sender: Arc<TelegramSender>,
        events_tx: mpsc::UnboundedSender<InboundEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            discord_sender,
            telegram_sender,
            events_tx,
            cancel,
        }
    }

    /// Run both clients, applying restarts until shutdown.
    ///
    /// Returns early if either client stops on its own.
    pub async fn run(
        self,
        discord: DiscordBot,
        telegram: TelegramBot,
        mut restarts: mpsc::UnboundedReceiver<ClientRestart>,
    ) {
        let mut discord = self.spawn_discord(discord);
        let mut telegram = self.spawn_telegram(telegram);

        let last = loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Shutdown,
                result = &mut discord.handle => {
                    if let Err(e) = result {
                        error!("Discord client task failed: {}", e);
                    }
                    Step::DiscordEnded
                }
                result = &mut telegram.handle => {
                    if let Err(e) = result {
                        error!("Telegram client task failed: {}", e);
                    }
                    Step::TelegramEnded
                }
                Some(restart) = restarts.recv() => Step::Restart(restart),
            };

            match step {
                Step::Restart(ClientRestart::Discord(config)) => {
                    info!("Discord settings changed, restarting client");
                    let built =
                        DiscordBot::build(config.token, config.relay_bots, self.events_tx.clone()).await;
                    discord = restart(discord, built, &self.cancel, |bot, cancel| {
                        self.discord_sender.replace_http(bot.http());
                        bot.run(cancel)
                    })
                    .await;
                }
                Step::Restart(ClientRestart::Telegram(config)) => {
                    info!("Telegram settings changed, restarting client");
                    let built = TelegramBot::connect(&config.token, config.poll_timeout_secs).await;
                    let events_tx = self.events_tx.clone();
                    telegram = restart(telegram, built, &self.cancel, |bot, cancel| {
                        self.telegram_sender.replace_bot(bot.bot());
                        bot.run(events_tx, cancel)
                    })
                    .await;
                }
                step => break step,
            }
        };

        // A client whose task already ended must not be awaited again.
        match last {
            Step::DiscordEnded => {
                warn!("Discord client stopped");
                telegram.stop().await;
            }
            Step::TelegramEnded => {
                warn!("Telegram client stopped");
                discord.stop().await;
            }
            _ => {
                discord.stop().await;
                telegram.stop().await;
            }
        }
    }

    fn spawn_discord(&self, bot: DiscordBot) -> RunningClient {
        RunningClient::spawn("Discord", &self.cancel, |cancel| bot.run(cancel))
    }

    fn spawn_telegram(&self, bot: TelegramBot) -> RunningClient {
        let events_tx = self.events_tx.clone();
        RunningClient::spawn("Telegram", &self.cancel, |cancel| bot.run(events_tx, cancel))
    }
}
