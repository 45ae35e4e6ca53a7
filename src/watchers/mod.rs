use eyre::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::chain::ChainClient;
use crate::config::Config;

pub mod watcher;

pub use watcher::ChainWatcher;

/// Manages the two per-chain event watchers.
///
/// Each watcher runs on its own task so a stall observing one chain never
/// blocks observation of the other.
pub struct WatcherManager {
    source_watcher: ChainWatcher,
    dest_watcher: ChainWatcher,
}

impl WatcherManager {
    /// Create watchers for the source and destination chains
    pub fn new(
        config: &Config,
        db: SqlitePool,
        source_client: Arc<dyn ChainClient>,
        dest_client: Arc<dyn ChainClient>,
    ) -> Self {
        let source_watcher = ChainWatcher::new(
            "source",
            source_client,
            db.clone(),
            config.dest.chain_id,
            config.source.reorg_window,
            config.relayer.poll_interval_ms,
        );
        let dest_watcher = ChainWatcher::new(
            "dest",
            dest_client,
            db,
            config.source.chain_id,
            config.dest.reorg_window,
            config.relayer.poll_interval_ms,
        );

        info!(
            source_chain_id = config.source.chain_id,
            dest_chain_id = config.dest.chain_id,
            "Watcher manager created"
        );

        Self {
            source_watcher,
            dest_watcher,
        }
    }

    /// Run both watchers concurrently.
    /// Returns when any watcher fails or the shutdown signal is received.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        let source_watcher = self.source_watcher;
        join_set.spawn(async move { source_watcher.run().await });
        let dest_watcher = self.dest_watcher;
        join_set.spawn(async move { dest_watcher.run().await });

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping watchers");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A watcher exited unexpectedly without error");
                        Err(eyre::eyre!("watcher exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A watcher stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A watcher task panicked: {:?}", e);
                        Err(eyre::eyre!("watcher task panicked: {}", e))
                    }
                    None => {
                        error!("All watcher tasks exited unexpectedly");
                        Err(eyre::eyre!("all watcher tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
