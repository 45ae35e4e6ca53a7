//! Test fakes for the relay pipeline.
//!
//! `FakeChain` implements `ChainClient` over an in-memory ledger: the
//! source side tracks escrowed balance, the destination side tracks the
//! wrapped supply. Fault injection covers the failure modes the engine
//! must survive: submissions that never mine, transient RPC errors, and
//! on-chain reverts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::SqlitePool;

use lockmint_relayer::chain::{ChainClient, ChainError, ChainSide, RawEvent, TxStatus};
use lockmint_relayer::config::{ChainConfig, Config, DatabaseConfig, RelayerConfig};
use lockmint_relayer::store::{self, Action};
use lockmint_relayer::types::{ActionKind, EventKind};

pub const SOURCE_CHAIN_ID: u64 = 31337;
pub const DEST_CHAIN_ID: u64 = 31338;

/// A transaction accepted by the fake chain
#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub tx_hash: String,
    pub kind: ActionKind,
    pub recipient: String,
    pub amount: u128,
}

struct FakeChainInner {
    height: u64,
    events: Vec<RawEvent>,
    submissions: Vec<SubmittedTx>,
    /// tx_hash -> (mined block, success)
    receipts: HashMap<String, (u64, bool)>,
    next_tx: u64,
    /// When false, accepted submissions never get a receipt (dropped)
    mine_submissions: bool,
    /// When set, submit() fails with this error string
    submission_error: Option<String>,
    /// transaction_status() calls, to assert the landed-check ran
    status_checks: u64,
    // Ledger bookkeeping
    escrow_total: u128,
    wrapped: HashMap<String, u128>,
    released: HashMap<String, u128>,
}

/// In-memory ledger implementing the chain client contract
pub struct FakeChain {
    chain_id: u64,
    side: ChainSide,
    inner: Mutex<FakeChainInner>,
}

impl FakeChain {
    pub fn new(chain_id: u64, side: ChainSide) -> Self {
        Self {
            chain_id,
            side,
            inner: Mutex::new(FakeChainInner {
                height: 0,
                events: Vec::new(),
                submissions: Vec::new(),
                receipts: HashMap::new(),
                next_tx: 0,
                mine_submissions: true,
                submission_error: None,
                status_checks: 0,
                escrow_total: 0,
                wrapped: HashMap::new(),
                released: HashMap::new(),
            }),
        }
    }

    pub fn source() -> Self {
        Self::new(SOURCE_CHAIN_ID, ChainSide::Source)
    }

    pub fn dest() -> Self {
        Self::new(DEST_CHAIN_ID, ChainSide::Destination)
    }

    /// Mine empty blocks
    pub fn advance_blocks(&self, n: u64) {
        self.inner.lock().unwrap().height += n;
    }

    /// User deposits into escrow; emits `Locked` in a fresh block.
    /// Returns the event's tx hash.
    pub fn lock(&self, user: &str, amount: u128, destination: &str) -> String {
        assert_eq!(self.side, ChainSide::Source, "lock is a source-chain call");
        self.emit_event(EventKind::Lock, user, amount, destination, |inner| {
            inner.escrow_total += amount;
        })
    }

    /// Holder destroys representation tokens; emits `Burned`.
    pub fn burn(&self, user: &str, amount: u128, destination: &str) -> String {
        assert_eq!(self.side, ChainSide::Destination, "burn is a dest-chain call");
        self.emit_event(EventKind::Burn, user, amount, destination, |inner| {
            let balance = inner.wrapped.entry(user.to_string()).or_insert(0);
            *balance = balance.saturating_sub(amount);
        })
    }

    /// Look up an emitted event by tx hash
    pub fn fetch_event_for_claim(&self, tx_hash: &str) -> Option<RawEvent> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|e| e.tx_hash == tx_hash)
            .cloned()
    }

    /// Re-emit a previously emitted event under the same coordinates,
    /// simulating redelivery after a restart re-scan
    pub fn replay_event(&self, tx_hash: &str) {
        let mut inner = self.inner.lock().unwrap();
        let event = inner
            .events
            .iter()
            .find(|e| e.tx_hash == tx_hash)
            .expect("no such event to replay")
            .clone();
        inner.events.push(event);
    }

    fn emit_event(
        &self,
        kind: EventKind,
        user: &str,
        amount: u128,
        destination: &str,
        apply: impl FnOnce(&mut FakeChainInner),
    ) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.height += 1;
        inner.next_tx += 1;
        let tx_hash = format!("0x{:064x}", inner.next_tx);
        let event = RawEvent {
            chain_id: self.chain_id,
            tx_hash: tx_hash.clone(),
            log_index: 0,
            block_number: inner.height,
            kind,
            user: user.to_string(),
            amount: amount.to_string(),
            destination: destination.to_string(),
        };
        inner.events.push(event);
        apply(&mut inner);
        tx_hash
    }

    pub fn set_mine_submissions(&self, mine: bool) {
        self.inner.lock().unwrap().mine_submissions = mine;
    }

    pub fn set_submission_error(&self, error: Option<&str>) {
        self.inner.lock().unwrap().submission_error = error.map(String::from);
    }

    pub fn submission_count(&self) -> usize {
        self.inner.lock().unwrap().submissions.len()
    }

    pub fn submissions(&self) -> Vec<SubmittedTx> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn status_check_count(&self) -> u64 {
        self.inner.lock().unwrap().status_checks
    }

    pub fn wrapped_balance(&self, account: &str) -> u128 {
        *self
            .inner
            .lock()
            .unwrap()
            .wrapped
            .get(account)
            .unwrap_or(&0)
    }

    pub fn released_balance(&self, account: &str) -> u128 {
        *self
            .inner
            .lock()
            .unwrap()
            .released
            .get(account)
            .unwrap_or(&0)
    }

    pub fn escrow_total(&self) -> u128 {
        self.inner.lock().unwrap().escrow_total
    }

    pub fn wrapped_total(&self) -> u128 {
        self.inner.lock().unwrap().wrapped.values().sum()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        Ok(self.inner.lock().unwrap().height)
    }

    async fn fetch_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn submit(&self, action: &Action) -> Result<String, ChainError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.submission_error.clone() {
            return Err(ChainError::from_submission(error));
        }

        // Same routing guard as the production client
        match (action.kind, self.side) {
            (ActionKind::Mint, ChainSide::Destination)
            | (ActionKind::Release, ChainSide::Source) => {}
            _ => {
                return Err(ChainError::UnsupportedAction {
                    key: action.action_key.clone(),
                    chain_id: self.chain_id,
                })
            }
        }

        let amount: u128 = action
            .amount
            .parse()
            .map_err(|_| ChainError::InvalidAction(format!("bad amount: {}", action.amount)))?;

        inner.next_tx += 1;
        let tx_hash = format!("0xfake{:059x}", inner.next_tx);
        inner.submissions.push(SubmittedTx {
            tx_hash: tx_hash.clone(),
            kind: action.kind,
            recipient: action.recipient.clone(),
            amount,
        });

        if inner.mine_submissions {
            inner.height += 1;
            let mined_at = inner.height;
            inner.receipts.insert(tx_hash.clone(), (mined_at, true));
            match action.kind {
                ActionKind::Mint => {
                    *inner.wrapped.entry(action.recipient.clone()).or_insert(0) += amount;
                }
                ActionKind::Release => {
                    inner.escrow_total = inner.escrow_total.saturating_sub(amount);
                    *inner.released.entry(action.recipient.clone()).or_insert(0) += amount;
                }
            }
        }

        Ok(tx_hash)
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_checks += 1;
        Ok(match inner.receipts.get(tx_hash) {
            Some(&(block_number, success)) => TxStatus::Mined {
                block_number,
                success,
            },
            None => TxStatus::NotFound,
        })
    }
}

/// In-memory store with migrations applied
pub async fn test_pool() -> SqlitePool {
    let pool = store::create_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    store::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Relayer config wired for fast tests: no reorg lag, no confirmation
/// depth, zero backoff, immediate drop timeout.
pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        source: test_chain_config(SOURCE_CHAIN_ID),
        dest: test_chain_config(DEST_CHAIN_ID),
        relayer: RelayerConfig {
            poll_interval_ms: 10,
            retry_attempts: 3,
            retry_delay_ms: 0,
            confirmation_timeout_secs: 0,
        },
    }
}

fn test_chain_config(chain_id: u64) -> ChainConfig {
    ChainConfig {
        rpc_url: "http://localhost:8545".to_string(),
        chain_id,
        bridge_address: "0x0000000000000000000000000000000000000001".to_string(),
        private_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
            .to_string(),
        reorg_window: 0,
        confirmation_depth: 0,
    }
}
