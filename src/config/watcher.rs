//! Config file watcher and hot reload.
//!
//! Watches the directory holding the config file (editors often replace
//! the file instead of writing in place). On change the bridge links are
//! swapped in place and platform clients whose settings changed are asked
//! to restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify_debouncer_full::{
    new_debouncer, notify::EventKind, notify::RecommendedWatcher, notify::RecursiveMode,
    DebounceEventResult, Debouncer, RecommendedCache,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::LinkTableManager;
use crate::common::error::ConfigError;
use crate::config::types::{Config, DiscordConfig, TelegramConfig};
use crate::config::{env, load_config, validate};

/// Events emitted by the config watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWatchEvent {
    /// The config file was created, modified or replaced.
    Changed,
}

/// Watches the config file with debouncing.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl ConfigWatcher {
    /// Start watching `path`. Returns the watcher and a receiver for events.
    ///
    /// The watcher must be kept alive (not dropped) for events to continue.
    pub fn start(path: &Path) -> Result<(Self, mpsc::UnboundedReceiver<ConfigWatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let file_name = path.file_name().map(|n| n.to_os_string());
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let changed = events.iter().any(|event| {
                        matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_)
                        ) && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
                    });
                    if changed {
                        debug!("config watcher event");
                        let _ = tx.send(ConfigWatchEvent::Changed);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "config watcher error");
                    }
                }
            },
        )?;

        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "Watching config file for link changes");

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}

/// A platform client whose settings changed on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRestart {
    Discord(DiscordConfig),
    Telegram(TelegramConfig),
}

/// Outcome of an accepted reload.
#[derive(Debug)]
pub struct Reload {
    /// Generation of the new link table.
    pub generation: u64,
    /// The config now in effect.
    pub config: Config,
    pub restarts: Vec<ClientRestart>,
}

/// Client restarts needed to move from `running` to `next`.
pub fn client_restarts(running: &Config, next: &Config) -> Vec<ClientRestart> {
    let mut restarts = Vec::new();
    if next.discord != running.discord {
        restarts.push(ClientRestart::Discord(next.discord.clone()));
    }
    if next.telegram != running.telegram {
        restarts.push(ClientRestart::Telegram(next.telegram.clone()));
    }
    restarts
}

/// Reload the config at `path`, swapping its links into `manager`.
///
/// The whole file is validated, tokens included. The previous table stays
/// live on any error.
pub fn reload_config(path: &Path, manager: &LinkTableManager, running: &Config) -> Result<Reload, ConfigError> {
    let config = env::apply_env_overrides(load_config(path)?);
    validate::validate_config(&config)?;

    let generation = manager.reload_config(&config.bridge.links)?;
    let restarts = client_restarts(running, &config);

    Ok(Reload {
        generation,
        config,
        restarts,
    })
}

/// Apply config change events until shutdown.
///
/// Client restarts are sent on `restarts`.
pub async fn run_reload_loop(
    path: PathBuf,
    manager: Arc<LinkTableManager>,
    mut running: Config,
    mut events: mpsc::UnboundedReceiver<ConfigWatchEvent>,
    restarts: mpsc::UnboundedSender<ClientRestart>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(ConfigWatchEvent::Changed) => {
                    info!(path = %path.display(), "Config file changed, reloading");
                    match reload_config(&path, &manager, &running) {
                        Ok(reload) => {
                            info!(generation = reload.generation, "Bridge links reloaded");
                            for restart in reload.restarts {
                                if restarts.send(restart).is_err() {
                                    warn!("Client supervisor is gone, settings change not applied");
                                }
                            }
                            running = reload.config;
                        }
                        Err(e) => error!("Config reload rejected, keeping current config: {}", e),
                    }
                }
                None => break,
            },
        }
    }
    debug!("Config reload loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::links::LinkTable;
    use crate::config::parser::load_config_str;

    fn config_text(links: &str) -> String {
        format!(
            r#"
            discord {{ token = "d" }}
            telegram {{ token = "t" }}
            bridge {{ links = [ {} ] }}
            "#,
            links
        )
    }

    #[test]
    fn test_reload_config_swaps_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaycord.conf");
        std::fs::write(&path, config_text("{ discord_channel = 5, telegram_chat = -5 }")).unwrap();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = LinkTableManager::new(LinkTable::default());

        let reload = reload_config(&path, &manager, &running).unwrap();
        assert_eq!(reload.generation, 2);
        assert!(reload.restarts.is_empty());
        assert_eq!(manager.snapshot().from_discord(5).len(), 1);
    }

    #[test]
    fn test_reload_config_reports_token_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaycord.conf");
        std::fs::write(
            &path,
            r#"
            discord { token = "d2" }
            telegram { token = "t" }
            bridge { links = [] }
            "#,
        )
        .unwrap();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = LinkTableManager::new(LinkTable::default());

        let reload = reload_config(&path, &manager, &running).unwrap();
        assert_eq!(reload.restarts.len(), 1);
        match &reload.restarts[0] {
            ClientRestart::Discord(discord) => assert_eq!(discord.token, "d2"),
            other => panic!("unexpected restart {:?}", other),
        }
        assert_eq!(reload.config.discord.token, "d2");
    }

    #[test]
    fn test_reload_config_rejects_empty_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaycord.conf");
        std::fs::write(
            &path,
            r#"
            discord { token = "" }
            telegram { token = "t" }
            bridge { links = [ { discord_channel = 5, telegram_chat = -5 } ] }
            "#,
        )
        .unwrap();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = LinkTableManager::new(LinkTable::default());

        let result = reload_config(&path, &manager, &running);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
        assert_eq!(manager.generation(), 1);
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn test_client_restarts_per_platform() {
        let running = load_config_str(&config_text("")).unwrap();
        assert!(client_restarts(&running, &running).is_empty());

        let mut next = running.clone();
        next.discord.relay_bots = !running.discord.relay_bots;
        next.telegram.poll_timeout_secs = running.telegram.poll_timeout_secs + 1;

        let restarts = client_restarts(&running, &next);
        assert_eq!(
            restarts,
            vec![
                ClientRestart::Discord(next.discord.clone()),
                ClientRestart::Telegram(next.telegram.clone()),
            ]
        );
    }

    #[test]
    fn test_client_restarts_ignores_link_changes() {
        let running = load_config_str(&config_text("")).unwrap();
        let next = load_config_str(&config_text("{ discord_channel = 5, telegram_chat = -5 }")).unwrap();
        assert!(client_restarts(&running, &next).is_empty());
    }

    #[test]
    fn test_reload_config_rejects_zero_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaycord.conf");
        std::fs::write(&path, config_text("{ discord_channel = 5, telegram_chat = 0 }")).unwrap();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = LinkTableManager::new(LinkTable::default());

        let result = reload_config(&path, &manager, &running);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_reload_config_rejects_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaycord.conf");
        std::fs::write(&path, "bridge { links = [ ").unwrap();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = LinkTableManager::new(LinkTable::default());

        assert!(reload_config(&path, &manager, &running).is_err());
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test]
    async fn test_reload_loop_stops_on_cancel() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (restarts_tx, _restarts_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = Arc::new(LinkTableManager::new(LinkTable::default()));
        tokio::time::timeout(
            Duration::from_secs(1),
            run_reload_loop(
                PathBuf::from("relaycord.conf"),
                manager,
                running,
                rx,
                restarts_tx,
                cancel,
            ),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_reload_loop_sends_restart_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaycord.conf");
        std::fs::write(
            &path,
            r#"
            discord { token = "d" }
            telegram { token = "t2" }
            bridge { links = [] }
            "#,
        )
        .unwrap();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (restarts_tx, mut restarts_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let running = load_config_str(&config_text("")).unwrap();
        let manager = Arc::new(LinkTableManager::new(LinkTable::default()));
        let task = tokio::spawn(run_reload_loop(
            path,
            manager.clone(),
            running,
            events_rx,
            restarts_tx,
            cancel.clone(),
        ));

        // The same file twice: the second reload finds nothing new to restart.
        events_tx.send(ConfigWatchEvent::Changed).unwrap();
        events_tx.send(ConfigWatchEvent::Changed).unwrap();

        let restart = tokio::time::timeout(Duration::from_secs(1), restarts_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(restart, ClientRestart::Telegram(ref t) if t.token == "t2"));

        // Dropping the event sender ends the loop after both events are handled.
        drop(events_tx);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(manager.generation(), 3);
        assert!(restarts_rx.try_recv().is_err());
    }
}
