//! Common types for the relay pipeline: event kinds, action kinds, the
//! deterministic action key, and the database-compatible status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an observed bridge event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Escrow deposit on the source chain
    Lock,
    /// Representation destroyed on the destination chain
    Burn,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Lock => "lock",
            EventKind::Burn => "burn",
        }
    }

    /// The counter-chain action this event triggers
    pub fn counter_action(&self) -> ActionKind {
        match self {
            EventKind::Lock => ActionKind::Mint,
            EventKind::Burn => ActionKind::Release,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a counter-chain action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Issue the representation on the destination chain
    Mint,
    /// Return escrowed originals on the source chain
    Release,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Mint => "mint",
            ActionKind::Release => "release",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deterministic dedup identifier for a counter-chain action.
///
/// Derived from the triggering event's (chain id, tx hash, log index) plus
/// the action kind. Two events with identical payloads but different
/// tx hash or log index produce different keys; the same event always
/// produces the same key. This key is the primary key of the dispatch
/// ledger and therefore the exactly-once gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey(String);

impl ActionKey {
    pub fn derive(kind: ActionKind, chain_id: u64, tx_hash: &str, log_index: u64) -> Self {
        // Tx hashes arrive with mixed casing depending on the RPC node;
        // normalize so the key stays deterministic across providers.
        ActionKey(format!(
            "{}:{}:{}:{}",
            kind.as_str(),
            chain_id,
            tx_hash.to_lowercase(),
            log_index
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status for actions in the dispatch ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Submitted => "submitted",
            Status::Confirmed => "confirmed",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
