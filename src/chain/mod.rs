//! Chain client abstraction.
//!
//! All ledger interaction goes through the [`ChainClient`] trait so the
//! relay engine never touches a provider directly. The production
//! implementation is [`EvmChainClient`]; tests implement the trait with
//! in-memory fakes that can simulate dropped transactions, reverts, and
//! transient RPC failures.
//!
//! Every error crossing this boundary is classified into a typed
//! [`ChainError`]; the engine decides retry-vs-fail from the type alone and
//! never inspects provider error strings.

use async_trait::async_trait;
use thiserror::Error;

use crate::store::models::Action;
use crate::types::EventKind;

pub mod evm;

pub use evm::EvmChainClient;

/// Which bridge contract a chain hosts.
///
/// The source chain escrows originals (emits `Locked`, accepts `release`);
/// the destination chain manages the representation (emits `Burned`,
/// accepts `mint`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSide {
    Source,
    Destination,
}

impl ChainSide {
    /// The event kind this chain's bridge emits
    pub fn event_kind(&self) -> EventKind {
        match self {
            ChainSide::Source => EventKind::Lock,
            ChainSide::Destination => EventKind::Burn,
        }
    }
}

/// A bridge event decoded from a log, not yet recorded
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub kind: EventKind,
    pub user: String,
    pub amount: String,
    pub destination: String,
}

/// Inclusion status of a previously submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// No receipt: the transaction is in-flight, dropped, or replaced
    NotFound,
    /// Mined at `block_number`; `success` is the receipt status
    Mined { block_number: u64, success: bool },
}

/// Typed outcome of a chain interaction
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport/node trouble; safe to retry with backoff
    #[error("rpc error: {0}")]
    Rpc(String),
    /// The node accepted the call but execution reverted; terminal for
    /// this submission attempt
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// The node answered with something we cannot interpret
    #[error("invalid response from node: {0}")]
    InvalidResponse(String),
    /// The action's stored payload cannot be turned into a call
    #[error("invalid action payload: {0}")]
    InvalidAction(String),
    /// The action kind does not belong on this chain
    #[error("action {key} is not dispatchable on chain {chain_id}")]
    UnsupportedAction { key: String, chain_id: u64 },
}

impl ChainError {
    /// Whether the engine should keep the action Pending and retry
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::InvalidResponse(_))
    }

    /// Classify a raw submission error string into a typed outcome.
    ///
    /// Providers surface reverts and transport failures through the same
    /// string-typed error, so the boundary has to pattern-match.
    pub fn from_submission(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_error(&message) {
            ErrorClass::Permanent => ChainError::Reverted(message),
            _ => ChainError::Rpc(message),
        }
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues)
    Transient,
    /// Nonce too low - a previous submission already landed
    NonceTooLow,
    /// Permanent failure - do not retry (revert, invalid params)
    Permanent,
    /// Unknown error - may retry with backoff
    Unknown,
}

/// Classify an error string for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    // Transient errors
    if error_lower.contains("timeout")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("underpriced")
    {
        return ErrorClass::Transient;
    }

    // Nonce errors
    if error_lower.contains("nonce too low") || error_lower.contains("already known") {
        return ErrorClass::NonceTooLow;
    }

    // Permanent errors
    if error_lower.contains("reverted")
        || error_lower.contains("execution reverted")
        || error_lower.contains("invalid signature")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
        || error_lower.contains("invalid parameters")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// One ledger, seen through its RPC endpoint.
///
/// Implementations hold the chain's authorizing key but no bridge state;
/// everything durable lives in the store.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native chain id of this ledger
    fn chain_id(&self) -> u64;

    /// Current head block number
    async fn latest_block(&self) -> Result<u64, ChainError>;

    /// Fetch this chain's bridge events in the inclusive block range.
    /// Malformed logs are skipped, not fatal.
    async fn fetch_events(&self, from_block: u64, to_block: u64)
        -> Result<Vec<RawEvent>, ChainError>;

    /// Send the counter-chain call for `action` and return the pending
    /// transaction hash. Does not wait for inclusion.
    async fn submit(&self, action: &Action) -> Result<String, ChainError>;

    /// Look up the inclusion status of a submitted transaction
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, ChainError>;
}
