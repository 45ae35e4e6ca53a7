//! Transaction dispatch.
//!
//! One dispatcher per target chain drains Pending actions from the
//! dispatch ledger and submits them through that chain's client. Restart
//! recovery is free: in-flight work is whatever `list_pending_actions`
//! returns on the next pass.

use eyre::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::chain::{ChainClient, ChainError};
use crate::config::Config;
use crate::metrics;
use crate::store::{self, Action};

pub mod retry;

pub use retry::RetryConfig;

/// Circuit breaker configuration for the dispatcher manager
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before pausing
    pub threshold: u32,
    /// How long to pause when circuit breaker trips
    pub pause_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            pause_duration: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Submits counter-chain actions for one target chain
pub struct Dispatcher {
    label: &'static str,
    client: Arc<dyn ChainClient>,
    db: SqlitePool,
    chain_id: u64,
    retry_config: RetryConfig,
}

impl Dispatcher {
    pub fn new(
        label: &'static str,
        client: Arc<dyn ChainClient>,
        db: SqlitePool,
        retry_config: RetryConfig,
    ) -> Self {
        let chain_id = client.chain_id();
        Self {
            label,
            client,
            db,
            chain_id,
            retry_config,
        }
    }

    /// Submit every due Pending action targeting this chain.
    ///
    /// Submissions run sequentially: the chain has a single authorizing
    /// key, and concurrent sends would contend on its nonce.
    pub async fn process_pending(&self) -> Result<()> {
        let actions = store::list_pending_actions(&self.db, self.chain_id as i64).await?;

        for action in actions {
            if let Err(e) = self.process_action(&action).await {
                tracing::error!(
                    chain = self.label,
                    action_key = %action.action_key,
                    error = %e,
                    "Failed to process action"
                );
            }
        }

        Ok(())
    }

    /// Drive one Pending action: Submitted on success, Pending-with-backoff
    /// on transient failure, Failed on terminal revert or exhausted budget.
    async fn process_action(&self, action: &Action) -> Result<()> {
        if !self.retry_config.should_retry(action.attempts as u32) {
            let reason = format!(
                "retry budget exhausted after {} attempts (last error: {})",
                action.attempts,
                action.last_error.as_deref().unwrap_or("none")
            );
            store::update_action_failed(&self.db, &action.action_key, &reason).await?;
            tracing::warn!(
                chain = self.label,
                action_key = %action.action_key,
                attempts = action.attempts,
                "Action failed: retry budget exhausted"
            );
            return Ok(());
        }

        match self.client.submit(action).await {
            Ok(tx_hash) => {
                let advanced =
                    store::update_action_submitted(&self.db, &action.action_key, &tx_hash).await?;
                if !advanced {
                    // A concurrent pass already moved it; benign replay
                    tracing::warn!(
                        chain = self.label,
                        action_key = %action.action_key,
                        tx_hash = %tx_hash,
                        "Submission raced another pass, transition rejected"
                    );
                    return Ok(());
                }
                metrics::record_submission(self.label, true);
                tracing::info!(
                    chain = self.label,
                    action_key = %action.action_key,
                    kind = %action.kind,
                    tx_hash = %tx_hash,
                    recipient = %action.recipient,
                    amount = %action.amount,
                    "Action submitted"
                );
            }
            Err(e) if e.is_transient() => {
                metrics::record_submission(self.label, false);
                let next_attempt = action.attempts as u32;
                let retry_after = self.retry_config.next_retry_after(next_attempt);
                store::update_action_for_retry(
                    &self.db,
                    &action.action_key,
                    &e.to_string(),
                    retry_after,
                )
                .await?;
                tracing::warn!(
                    chain = self.label,
                    action_key = %action.action_key,
                    attempt = next_attempt + 1,
                    max = self.retry_config.max_retries,
                    retry_after = %retry_after,
                    error = %e,
                    "Transient submission failure, will retry"
                );
            }
            Err(e) => {
                metrics::record_submission(self.label, false);
                store::update_action_failed(&self.db, &action.action_key, &e.to_string()).await?;
                tracing::error!(
                    chain = self.label,
                    action_key = %action.action_key,
                    error = %e,
                    "Terminal submission failure, action failed"
                );
                if let ChainError::Reverted(_) = e {
                    metrics::record_error(self.label, "revert");
                }
            }
        }

        Ok(())
    }
}

/// Manages the per-chain dispatchers.
///
/// Mint actions go to the destination chain's dispatcher, Release actions
/// to the source chain's. A circuit breaker pauses a direction after
/// repeated whole-cycle failures so a dead RPC endpoint does not spin.
pub struct DispatcherManager {
    source_dispatcher: Dispatcher,
    dest_dispatcher: Dispatcher,
    poll_interval: Duration,
    circuit_breaker: CircuitBreakerConfig,
    consecutive_source_failures: u32,
    consecutive_dest_failures: u32,
}

impl DispatcherManager {
    pub fn new(
        config: &Config,
        db: SqlitePool,
        source_client: Arc<dyn ChainClient>,
        dest_client: Arc<dyn ChainClient>,
    ) -> Self {
        let retry_config = RetryConfig::from_relayer_config(&config.relayer);

        let source_dispatcher = Dispatcher::new(
            "source",
            source_client,
            db.clone(),
            retry_config.clone(),
        );
        let dest_dispatcher = Dispatcher::new("dest", dest_client, db, retry_config);

        Self {
            source_dispatcher,
            dest_dispatcher,
            poll_interval: Duration::from_millis(config.relayer.poll_interval_ms),
            circuit_breaker: CircuitBreakerConfig::default(),
            consecutive_source_failures: 0,
            consecutive_dest_failures: 0,
        }
    }

    /// Run the dispatch loop
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut cycle_count = 0u64;

        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Dispatcher manager starting poll loop"
        );

        loop {
            cycle_count += 1;

            // Log every 12 cycles to show the dispatcher is alive
            if cycle_count % 12 == 1 {
                tracing::info!(
                    cycle = cycle_count,
                    source_failures = self.consecutive_source_failures,
                    dest_failures = self.consecutive_dest_failures,
                    "Dispatcher manager heartbeat"
                );
            }

            tokio::select! {
                _ = self.process_pending() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping dispatchers");
                    return Ok(());
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn process_pending(&mut self) {
        // Mint side (destination chain)
        if self.consecutive_dest_failures >= self.circuit_breaker.threshold {
            tracing::warn!(
                failures = self.consecutive_dest_failures,
                pause_secs = self.circuit_breaker.pause_duration.as_secs(),
                "Destination circuit breaker tripped, pausing mint dispatch"
            );
            tokio::time::sleep(self.circuit_breaker.pause_duration).await;
            self.consecutive_dest_failures = 0;
        }

        match self.dest_dispatcher.process_pending().await {
            Ok(()) => {
                self.consecutive_dest_failures = 0;
            }
            Err(e) => {
                self.consecutive_dest_failures += 1;
                metrics::set_consecutive_failures("dest", self.consecutive_dest_failures);
                tracing::error!(
                    error = %e,
                    consecutive_failures = self.consecutive_dest_failures,
                    "Error processing mint dispatch cycle"
                );
            }
        }

        // Release side (source chain)
        if self.consecutive_source_failures >= self.circuit_breaker.threshold {
            tracing::warn!(
                failures = self.consecutive_source_failures,
                pause_secs = self.circuit_breaker.pause_duration.as_secs(),
                "Source circuit breaker tripped, pausing release dispatch"
            );
            tokio::time::sleep(self.circuit_breaker.pause_duration).await;
            self.consecutive_source_failures = 0;
        }

        match self.source_dispatcher.process_pending().await {
            Ok(()) => {
                self.consecutive_source_failures = 0;
            }
            Err(e) => {
                self.consecutive_source_failures += 1;
                metrics::set_consecutive_failures("source", self.consecutive_source_failures);
                tracing::error!(
                    error = %e,
                    consecutive_failures = self.consecutive_source_failures,
                    "Error processing release dispatch cycle"
                );
            }
        }
    }
}
