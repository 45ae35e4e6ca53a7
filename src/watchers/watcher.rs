//! Per-chain event watcher.
//!
//! Pulls finalized log ranges from the chain client, records each event in
//! the durable log, and claims the counter-chain action. The watcher never
//! submits anything itself; once an action is claimed the dispatcher owns
//! it. This replaces subscribe-and-react callbacks with an explicit,
//! replayable poll loop: a crash at any point is recovered by re-scanning
//! from the checkpoint, with dedup and the claim gate absorbing redelivery.

use eyre::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainClient, RawEvent};
use crate::metrics;
use crate::store::{self, CheckpointUpdate, ClaimOutcome, NewAction, NewObservedEvent, RecordOutcome};

/// Event watcher for one chain
pub struct ChainWatcher {
    label: &'static str,
    client: Arc<dyn ChainClient>,
    db: SqlitePool,
    chain_id: u64,
    /// Chain the counter-action targets
    counter_chain_id: u64,
    reorg_window: u64,
    poll_interval: Duration,
}

impl ChainWatcher {
    pub fn new(
        label: &'static str,
        client: Arc<dyn ChainClient>,
        db: SqlitePool,
        counter_chain_id: u64,
        reorg_window: u64,
        poll_interval_ms: u64,
    ) -> Self {
        let chain_id = client.chain_id();
        Self {
            label,
            client,
            db,
            chain_id,
            counter_chain_id,
            reorg_window,
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    /// First block to scan after a (re)start.
    ///
    /// One reorg window behind the stored checkpoint, never past it: blocks
    /// inside the window may have been reorganized after the checkpoint was
    /// written, so their events are re-delivered and deduplicated rather
    /// than trusted.
    pub async fn resume_block(&self) -> Result<u64> {
        let checkpoint = store::get_checkpoint(&self.db, self.chain_id as i64).await?;
        Ok(match checkpoint {
            Some(block) => (block as u64).saturating_sub(self.reorg_window),
            None => 0,
        })
    }

    /// Run the watcher loop
    pub async fn run(&self) -> Result<()> {
        let mut next_from = self.resume_block().await?;

        tracing::info!(
            chain = self.label,
            chain_id = self.chain_id,
            start_block = next_from,
            reorg_window = self.reorg_window,
            "Watcher starting"
        );

        loop {
            match self.poll_once(next_from).await {
                Ok(Some(processed_to)) => {
                    next_from = processed_to + 1;
                }
                Ok(None) => {
                    // No new finalized blocks yet
                }
                Err(e) => {
                    metrics::record_error(self.label, "watch");
                    tracing::error!(
                        chain = self.label,
                        error = %e,
                        "Watcher poll failed, will retry"
                    );
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll pass: scan finalized blocks from `from_block`, record and
    /// claim everything found, then advance the checkpoint. Returns the
    /// last block processed, or None if no finalized block is new.
    pub async fn poll_once(&self, from_block: u64) -> Result<Option<u64>> {
        let latest = self.client.latest_block().await?;
        let safe_head = latest.saturating_sub(self.reorg_window);

        if safe_head < from_block {
            return Ok(None);
        }

        let events = self.client.fetch_events(from_block, safe_head).await?;

        tracing::debug!(
            chain = self.label,
            from_block,
            to_block = safe_head,
            events = events.len(),
            "Processing block range"
        );

        for event in &events {
            self.handle_event(event).await?;
        }

        // Checkpoint only after every event in the range is durable; a
        // crash in the middle re-scans the whole range.
        match store::update_checkpoint(&self.db, self.chain_id as i64, safe_head as i64).await? {
            CheckpointUpdate::Advanced => {}
            CheckpointUpdate::Rejected { current } => {
                tracing::warn!(
                    chain = self.label,
                    proposed = safe_head,
                    current,
                    "Checkpoint regression rejected"
                );
            }
        }

        metrics::record_block_processed(self.label, safe_head);
        Ok(Some(safe_head))
    }

    /// Record one event and claim its counter-chain action.
    ///
    /// The claim runs on every delivery, not only on fresh inserts: record
    /// and claim are separate statements, so a crash between them must not
    /// leave an event without its action. The claim itself is idempotent.
    async fn handle_event(&self, event: &RawEvent) -> Result<()> {
        match store::record_event_if_new(&self.db, &NewObservedEvent::from(event)).await? {
            RecordOutcome::Inserted => {
                metrics::record_event_observed(self.label, event.kind.as_str());
                tracing::info!(
                    chain = self.label,
                    kind = %event.kind,
                    tx_hash = %event.tx_hash,
                    log_index = event.log_index,
                    user = %event.user,
                    amount = %event.amount,
                    destination = %event.destination,
                    "New bridge event recorded"
                );
            }
            RecordOutcome::AlreadyPresent => {
                tracing::warn!(
                    chain = self.label,
                    tx_hash = %event.tx_hash,
                    log_index = event.log_index,
                    "Duplicate event delivery ignored"
                );
            }
        }

        let action = NewAction::from_event(event, self.counter_chain_id);
        match store::claim_action(&self.db, &action).await? {
            ClaimOutcome::Claimed => {
                metrics::record_action_claimed(action.kind.as_str());
                tracing::info!(
                    chain = self.label,
                    action_key = %action.action_key,
                    kind = %action.kind,
                    target_chain_id = action.target_chain_id,
                    recipient = %action.recipient,
                    amount = %action.amount,
                    "Claimed counter-chain action"
                );
            }
            ClaimOutcome::AlreadyClaimed(status) => {
                // The exactly-once guarantee manifesting as a no-op
                tracing::debug!(
                    chain = self.label,
                    action_key = %action.action_key,
                    status = %status,
                    "Action already claimed, nothing to do"
                );
            }
        }

        Ok(())
    }
}
