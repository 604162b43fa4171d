//! Live link table ownership and hot swapping.
//!
//! The current table is published through a `watch` channel holding an
//! `Arc<LinkTable>`. Dispatches clone the `Arc` once and route against that
//! snapshot until they finish; a reload builds a whole new table and
//! replaces the pointer. Readers never await and never see a partial table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::bridge::links::{links_from_config, BridgeLink, LinkTable};
use crate::common::error::ConfigError;
use crate::config::types::LinkConfig;

/// Shared link table snapshot.
pub type SharedLinkTable = Arc<LinkTable>;

/// Owner of the process-wide link table.
#[derive(Debug)]
pub struct LinkTableManager {
    current: watch::Sender<SharedLinkTable>,
    generation: AtomicU64,
}

impl LinkTableManager {
    /// Create a manager serving `table` as generation 1.
    pub fn new(table: LinkTable) -> Self {
        let (current, _) = watch::channel(Arc::new(table));
        Self {
            current,
            generation: AtomicU64::new(1),
        }
    }

    /// Build the initial table from configured links.
    pub fn from_config(configs: &[LinkConfig]) -> Result<Self, ConfigError> {
        let links = links_from_config(configs)?;
        let table = LinkTable::build(&links)?;
        if table.is_empty() {
            warn!("No bridge links configured, nothing will be relayed until the config changes");
        } else {
            info!(links = table.len(), "Loaded bridge links");
        }
        Ok(Self::new(table))
    }

    /// Current table snapshot.
    pub fn snapshot(&self) -> SharedLinkTable {
        Arc::clone(&self.current.borrow())
    }

    /// Generation of the table currently served.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the current table. Returns the new generation.
    ///
    /// The generation is bumped while the channel's write lock is held, so
    /// concurrent swaps number their tables in the order they land.
    pub fn swap(&self, table: LinkTable) -> u64 {
        let links = table.len();
        let table = Arc::new(table);
        let mut previous_links = 0;
        let mut generation = 0;

        self.current.send_modify(|current| {
            previous_links = current.len();
            *current = table;
            generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        });

        info!(generation, links, previous_links, "Swapped in new link table");
        generation
    }

    /// Build a table from `links` and swap it in.
    ///
    /// On error the current table stays live.
    pub fn reload(&self, links: &[BridgeLink]) -> Result<u64, ConfigError> {
        match LinkTable::build(links) {
            Ok(table) => Ok(self.swap(table)),
            Err(e) => {
                warn!(
                    generation = self.generation(),
                    "Keeping current link table, rejected new links: {}", e
                );
                Err(e)
            }
        }
    }

    /// Reload from configured links.
    pub fn reload_config(&self, configs: &[LinkConfig]) -> Result<u64, ConfigError> {
        let links = match links_from_config(configs) {
            Ok(links) => links,
            Err(e) => {
                warn!(
                    generation = self.generation(),
                    "Keeping current link table, rejected new links: {}", e
                );
                return Err(e);
            }
        };
        self.reload(&links)
    }
}
