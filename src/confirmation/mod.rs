//! Confirmation tracking.
//!
//! Polls Submitted actions and checks their inclusion depth on the target
//! chain. Checks fan out concurrently (bounded) because confirmation
//! latency varies per transaction and one slow receipt must not delay the
//! rest. A submission with no receipt after the configured timeout is
//! treated as dropped and requeued for resubmission; the receipt probe that
//! found nothing is the verification that the recorded hash never landed.

use chrono::Utc;
use eyre::Result;
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::chain::{ChainClient, TxStatus};
use crate::config::Config;
use crate::metrics;
use crate::store::{self, Action};

/// How many inclusion checks run concurrently per pass
const MAX_CONCURRENT_CHECKS: usize = 8;

/// One chain the tracker confirms against
struct ConfirmationTarget {
    label: &'static str,
    client: Arc<dyn ChainClient>,
    required_depth: u64,
}

/// Tracks submitted transactions on both chains until they confirm,
/// fail, or time out
pub struct ConfirmationTracker {
    db: SqlitePool,
    targets: HashMap<u64, ConfirmationTarget>,
    poll_interval: std::time::Duration,
    confirmation_timeout: chrono::Duration,
}

impl ConfirmationTracker {
    pub fn new(
        config: &Config,
        db: SqlitePool,
        source_client: Arc<dyn ChainClient>,
        dest_client: Arc<dyn ChainClient>,
    ) -> Self {
        let mut targets = HashMap::new();
        targets.insert(
            config.source.chain_id,
            ConfirmationTarget {
                label: "source",
                client: source_client,
                required_depth: config.source.confirmation_depth,
            },
        );
        targets.insert(
            config.dest.chain_id,
            ConfirmationTarget {
                label: "dest",
                client: dest_client,
                required_depth: config.dest.confirmation_depth,
            },
        );

        Self {
            db,
            targets,
            poll_interval: std::time::Duration::from_millis(config.relayer.poll_interval_ms),
            confirmation_timeout: chrono::Duration::seconds(
                config.relayer.confirmation_timeout_secs as i64,
            ),
        }
    }

    /// Run the confirmation loop
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            confirmation_timeout_secs = self.confirmation_timeout.num_seconds(),
            "Starting confirmation tracker"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping confirmation tracker");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(err) = self.process_pending().await {
                        tracing::error!(error = %err, "Error processing submitted actions");
                    }
                }
            }
        }

        Ok(())
    }

    /// Check every Submitted action once, fanned out with bounded
    /// concurrency
    pub async fn process_pending(&self) -> Result<()> {
        let submitted = store::list_submitted_actions(&self.db).await?;
        if submitted.is_empty() {
            return Ok(());
        }

        stream::iter(submitted)
            .map(|action| self.check_action(action))
            .buffer_unordered(MAX_CONCURRENT_CHECKS)
            .collect::<Vec<()>>()
            .await;

        Ok(())
    }

    /// Drive one Submitted action towards Confirmed, Failed, or back to
    /// Pending. Errors are logged, never propagated: the next pass retries.
    async fn check_action(&self, action: Action) {
        let target = match self.targets.get(&(action.target_chain_id as u64)) {
            Some(target) => target,
            None => {
                tracing::error!(
                    action_key = %action.action_key,
                    target_chain_id = action.target_chain_id,
                    "Submitted action targets an unknown chain"
                );
                return;
            }
        };

        let tx_hash = match action.tx_hash.as_deref() {
            Some(hash) => hash,
            None => {
                tracing::error!(
                    action_key = %action.action_key,
                    "Submitted action has no transaction hash"
                );
                return;
            }
        };

        tracing::debug!(
            chain = target.label,
            action_key = %action.action_key,
            tx_hash = %tx_hash,
            "Checking action confirmation"
        );

        match target.client.transaction_status(tx_hash).await {
            Ok(TxStatus::Mined {
                block_number,
                success: true,
            }) => {
                self.handle_mined(target, &action, tx_hash, block_number).await;
            }
            Ok(TxStatus::Mined { success: false, .. }) => {
                if let Err(e) = store::update_action_failed(
                    &self.db,
                    &action.action_key,
                    "transaction reverted on-chain",
                )
                .await
                {
                    tracing::error!(action_key = %action.action_key, error = %e, "Failed to record revert");
                    return;
                }
                metrics::record_error(target.label, "revert");
                tracing::warn!(
                    chain = target.label,
                    action_key = %action.action_key,
                    tx_hash = %tx_hash,
                    "Action failed: transaction reverted on-chain"
                );
            }
            Ok(TxStatus::NotFound) => {
                self.handle_missing(target, &action, tx_hash).await;
            }
            Err(err) => {
                tracing::warn!(
                    chain = target.label,
                    action_key = %action.action_key,
                    tx_hash = %tx_hash,
                    error = %err,
                    "Error checking action confirmation"
                );
            }
        }
    }

    async fn handle_mined(
        &self,
        target: &ConfirmationTarget,
        action: &Action,
        tx_hash: &str,
        block_number: u64,
    ) {
        let latest = match target.client.latest_block().await {
            Ok(latest) => latest,
            Err(err) => {
                tracing::warn!(
                    chain = target.label,
                    error = %err,
                    "Failed to read head while checking confirmations"
                );
                return;
            }
        };

        let confirmations = latest.saturating_sub(block_number);
        if confirmations < target.required_depth {
            tracing::debug!(
                chain = target.label,
                action_key = %action.action_key,
                confirmations,
                required = target.required_depth,
                "Waiting for confirmation depth"
            );
            return;
        }

        match store::update_action_confirmed(&self.db, &action.action_key).await {
            Ok(true) => {
                metrics::record_confirmation(target.label);
                tracing::info!(
                    chain = target.label,
                    action_key = %action.action_key,
                    tx_hash = %tx_hash,
                    confirmations,
                    "Action confirmed"
                );
            }
            Ok(false) => {
                tracing::warn!(
                    action_key = %action.action_key,
                    "Confirmation raced another transition, rejected"
                );
            }
            Err(e) => {
                tracing::error!(action_key = %action.action_key, error = %e, "Failed to record confirmation");
            }
        }
    }

    /// No receipt for the recorded hash. Inside the timeout that just means
    /// in-flight; past it the transaction is considered dropped/replaced
    /// and the action goes back to Pending for resubmission.
    async fn handle_missing(&self, target: &ConfirmationTarget, action: &Action, tx_hash: &str) {
        let submitted_at = match action.submitted_at {
            Some(at) => at,
            None => {
                tracing::error!(
                    action_key = %action.action_key,
                    "Submitted action has no submission timestamp"
                );
                return;
            }
        };

        let age = Utc::now() - submitted_at;
        if age < self.confirmation_timeout {
            tracing::debug!(
                chain = target.label,
                action_key = %action.action_key,
                tx_hash = %tx_hash,
                age_secs = age.num_seconds(),
                "No receipt yet, within confirmation timeout"
            );
            return;
        }

        let reason = format!(
            "transaction {} dropped: no receipt after {}s",
            tx_hash,
            age.num_seconds()
        );
        match store::requeue_dropped_action(&self.db, &action.action_key, &reason).await {
            Ok(true) => {
                metrics::record_error(target.label, "dropped");
                tracing::warn!(
                    chain = target.label,
                    action_key = %action.action_key,
                    tx_hash = %tx_hash,
                    age_secs = age.num_seconds(),
                    "Submission dropped, requeued for resubmission"
                );
            }
            Ok(false) => {
                tracing::warn!(
                    action_key = %action.action_key,
                    "Requeue raced another transition, rejected"
                );
            }
            Err(e) => {
                tracing::error!(action_key = %action.action_key, error = %e, "Failed to requeue dropped action");
            }
        }
    }
}
