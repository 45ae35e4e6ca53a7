//! Alloy-backed chain client.
//!
//! Log fetching goes through an alloy HTTP provider; submissions build a
//! wallet-filled provider around the chain's authorizing key; receipt
//! checks use raw `eth_getTransactionReceipt` JSON-RPC so a missing receipt
//! is distinguishable from a transport failure.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use eyre::{Result, WrapErr};
use reqwest::Url;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::{ChainClient, ChainError, ChainSide, RawEvent, TxStatus};
use crate::config::ChainConfig;
use crate::contracts::{DestBridge, SourceBridge};
use crate::hash::{burned_event_signature, locked_event_signature};
use crate::store::models::Action;
use crate::types::ActionKind;

/// EVM transaction receipt from RPC
#[derive(Debug, Deserialize)]
struct TransactionReceipt {
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
    status: Option<String>,
}

/// EVM RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// EVM RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Chain client for one EVM-style ledger
pub struct EvmChainClient {
    chain_id: u64,
    rpc_url: Url,
    bridge_address: Address,
    signer: PrivateKeySigner,
    side: ChainSide,
    provider: RootProvider<Http<Client>>,
    http: reqwest::Client,
}

impl EvmChainClient {
    /// Create a client for one chain from its config block.
    ///
    /// Fails fast on malformed addresses, keys, or URLs so a broken
    /// configuration aborts startup instead of surfacing mid-relay.
    pub fn new(config: &ChainConfig, side: ChainSide) -> Result<Self> {
        let rpc_url: Url = config.rpc_url.parse().wrap_err("Failed to parse RPC URL")?;
        let bridge_address =
            Address::from_str(&config.bridge_address).wrap_err("Invalid bridge address")?;
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .wrap_err("Invalid private key")?;
        let provider = ProviderBuilder::new().on_http(rpc_url.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build HTTP client")?;

        tracing::info!(
            chain_id = config.chain_id,
            bridge_address = %bridge_address,
            relayer_address = %signer.address(),
            side = ?side,
            "Chain client initialized"
        );

        Ok(Self {
            chain_id: config.chain_id,
            rpc_url,
            bridge_address,
            signer,
            side,
            provider,
            http,
        })
    }

    /// Topic-0 of the event this chain's bridge emits
    fn event_signature(&self) -> B256 {
        match self.side {
            ChainSide::Source => B256::from(locked_event_signature()),
            ChainSide::Destination => B256::from(burned_event_signature()),
        }
    }

    /// Decode a bridge log into a raw event.
    ///
    /// Layout for both `Locked` and `Burned`:
    /// topics\[0\] = signature, topics\[1\] = user (indexed, padded address);
    /// data = amount (uint256) || destination (right-aligned address).
    fn parse_bridge_log(&self, log: &Log) -> Result<RawEvent> {
        let topics = log.topics();
        if topics.len() < 2 {
            return Err(eyre::eyre!("Missing indexed user topic"));
        }
        let user = Address::from_slice(&topics[1].as_slice()[12..32]);

        let data = log.data().data.as_ref();
        if data.len() < 64 {
            return Err(eyre::eyre!("Log data too short: {} bytes", data.len()));
        }
        let amount = U256::from_be_slice(&data[0..32]);
        let destination = Address::from_slice(&data[32 + 12..64]);

        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| eyre::eyre!("Missing transaction hash"))?;
        let block_number = log
            .block_number
            .ok_or_else(|| eyre::eyre!("Missing block number"))?;
        let log_index = log
            .log_index
            .ok_or_else(|| eyre::eyre!("Missing log index"))?;

        Ok(RawEvent {
            chain_id: self.chain_id,
            tx_hash: format!("{:?}", tx_hash),
            log_index,
            block_number,
            kind: self.side.event_kind(),
            user: format!("{:?}", user),
            amount: amount.to_string(),
            destination: format!("{:?}", destination),
        })
    }

    fn parse_recipient_and_amount(&self, action: &Action) -> Result<(Address, U256), ChainError> {
        let recipient: Address = action.recipient.parse().map_err(|_| {
            ChainError::InvalidAction(format!("bad recipient address: {}", action.recipient))
        })?;
        let amount = U256::from_str(&action.amount)
            .map_err(|_| ChainError::InvalidAction(format!("bad amount: {}", action.amount)))?;
        Ok((recipient, amount))
    }
}

#[async_trait::async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn fetch_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, ChainError> {
        let filter = Filter::new()
            .address(self.bridge_address)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let signature = self.event_signature();
        let mut events = Vec::new();

        for log in logs {
            let topics = log.topics();
            if topics.is_empty() || topics[0] != signature {
                continue;
            }
            match self.parse_bridge_log(&log) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::error!(
                        chain_id = self.chain_id,
                        tx_hash = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        error = %e,
                        "Failed to parse bridge log, skipping"
                    );
                }
            }
        }

        Ok(events)
    }

    async fn submit(&self, action: &Action) -> Result<String, ChainError> {
        let (recipient, amount) = self.parse_recipient_and_amount(action)?;

        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());

        tracing::debug!(
            action_key = %action.action_key,
            kind = %action.kind,
            recipient = %recipient,
            amount = %amount,
            "Submitting counter-chain call"
        );

        let pending = match (action.kind, self.side) {
            (ActionKind::Mint, ChainSide::Destination) => {
                let contract = DestBridge::new(self.bridge_address, &provider);
                contract
                    .mint(recipient, amount)
                    .send()
                    .await
                    .map_err(|e| ChainError::from_submission(e.to_string()))?
            }
            (ActionKind::Release, ChainSide::Source) => {
                let contract = SourceBridge::new(self.bridge_address, &provider);
                contract
                    .release(recipient, amount)
                    .send()
                    .await
                    .map_err(|e| ChainError::from_submission(e.to_string()))?
            }
            _ => {
                return Err(ChainError::UnsupportedAction {
                    key: action.action_key.clone(),
                    chain_id: self.chain_id,
                })
            }
        };

        Ok(format!("0x{:x}", pending.tx_hash()))
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, ChainError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
            "id": 1
        });

        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .json::<RpcResponse<TransactionReceipt>>()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc(format!(
                "{} - {}",
                error.code, error.message
            )));
        }

        let receipt = match response.result {
            Some(receipt) => receipt,
            None => return Ok(TxStatus::NotFound),
        };

        let block_hex = receipt
            .block_number
            .ok_or_else(|| ChainError::InvalidResponse("receipt without block number".into()))?;
        let block_number = u64::from_str_radix(block_hex.trim_start_matches("0x"), 16)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        let success = receipt.status.as_deref() != Some("0x0");

        Ok(TxStatus::Mined {
            block_number,
            success,
        })
    }
}
