#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::chain::RawEvent;
use crate::types::{ActionKey, ActionKind, EventKind, Status};

// Note: amounts are stored as decimal strings (TEXT). Token amounts are
// uint256 on chain and never participate in arithmetic inside the relayer,
// so they round-trip as text end to end.

/// A bridge event that has been durably recorded
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ObservedEvent {
    pub id: i64,
    pub chain_id: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub kind: EventKind,
    pub user_address: String,
    pub amount: String,
    pub destination: String,
    pub block_number: i64,
    pub observed_at: DateTime<Utc>,
}

/// For inserting newly observed events
#[derive(Debug, Clone)]
pub struct NewObservedEvent {
    pub chain_id: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub kind: EventKind,
    pub user_address: String,
    pub amount: String,
    pub destination: String,
    pub block_number: i64,
}

impl From<&RawEvent> for NewObservedEvent {
    fn from(event: &RawEvent) -> Self {
        Self {
            chain_id: event.chain_id as i64,
            tx_hash: event.tx_hash.clone(),
            log_index: event.log_index as i64,
            kind: event.kind,
            user_address: event.user.clone(),
            amount: event.amount.clone(),
            destination: event.destination.clone(),
            block_number: event.block_number as i64,
        }
    }
}

/// A counter-chain action owned by the dispatch ledger
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Action {
    pub action_key: String,
    pub kind: ActionKind,
    pub source_chain_id: i64,
    pub source_tx_hash: String,
    pub source_log_index: i64,
    pub target_chain_id: i64,
    pub recipient: String,
    pub amount: String,
    pub status: Status,
    pub tx_hash: Option<String>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub retry_after: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For claiming new actions
#[derive(Debug, Clone)]
pub struct NewAction {
    pub action_key: ActionKey,
    pub kind: ActionKind,
    pub source_chain_id: i64,
    pub source_tx_hash: String,
    pub source_log_index: i64,
    pub target_chain_id: i64,
    pub recipient: String,
    pub amount: String,
}

impl NewAction {
    /// Derive the counter-chain action for an observed event.
    ///
    /// The recipient is the event's destination account; the relayer never
    /// resolves or validates it (the ledger's concern, not ours).
    pub fn from_event(event: &RawEvent, target_chain_id: u64) -> Self {
        let kind = event.kind.counter_action();
        Self {
            action_key: ActionKey::derive(kind, event.chain_id, &event.tx_hash, event.log_index),
            kind,
            source_chain_id: event.chain_id as i64,
            source_tx_hash: event.tx_hash.clone(),
            source_log_index: event.log_index as i64,
            target_chain_id: target_chain_id as i64,
            recipient: event.destination.clone(),
            amount: event.amount.clone(),
        }
    }
}

/// Tracks the last durably recorded block for one chain
#[derive(Debug, Clone, FromRow)]
pub struct Checkpoint {
    pub chain_id: i64,
    pub block_number: i64,
    pub updated_at: DateTime<Utc>,
}
