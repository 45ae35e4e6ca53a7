#![allow(dead_code)]

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;

/// Main configuration for the relayer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub source: ChainConfig,
    pub dest: ChainConfig,
    pub relayer: RelayerConfig,
}

/// Database configuration
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// Configuration for one chain, loaded from `SOURCE_*` or `DEST_*` vars
#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub bridge_address: String,
    /// Authorizing key for this chain's bridge calls. One key per chain;
    /// nonce management is scoped to this credential's submissions only.
    pub private_key: String,
    /// Blocks behind head before an event is treated as irreversible
    #[serde(default = "default_reorg_window")]
    pub reorg_window: u64,
    /// Inclusion depth required before a submission counts as Confirmed
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("bridge_address", &self.bridge_address)
            .field("private_key", &"<redacted>")
            .field("reorg_window", &self.reorg_window)
            .field("confirmation_depth", &self.confirmation_depth)
            .finish()
    }
}

/// Relayer tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// How long a Submitted action may sit without a receipt before it is
    /// treated as dropped and requeued
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

/// Default functions
fn default_reorg_window() -> u64 {
    12
}

fn default_confirmation_depth() -> u64 {
    6
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_confirmation_timeout() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
        };

        let source = load_chain_from_env("SOURCE")?;
        let dest = load_chain_from_env("DEST")?;

        let relayer = RelayerConfig {
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_poll_interval()),
            retry_attempts: env::var("RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_retry_attempts()),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_retry_delay()),
            confirmation_timeout_secs: env::var("CONFIRMATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirmation_timeout()),
        };

        let config = Config {
            database,
            source,
            dest,
            relayer,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        self.source.validate("source")?;
        self.dest.validate("dest")?;

        // Two watchers sharing a chain id would also share a checkpoint row
        // and silently skip each other's blocks.
        if self.source.chain_id == self.dest.chain_id {
            return Err(eyre!(
                "FATAL: source and dest share chain id {}. \
                 Each watcher keys its checkpoint by chain id; a shared id makes one \
                 watcher resume past blocks the other never scanned. \
                 Give the two chains distinct ids.",
                self.source.chain_id
            ));
        }

        if self.relayer.retry_attempts == 0 {
            return Err(eyre!("relayer.retry_attempts must be at least 1"));
        }

        Ok(())
    }
}

impl ChainConfig {
    fn validate(&self, label: &str) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(eyre!("{}.rpc_url cannot be empty", label));
        }

        if self.bridge_address.len() != 42 || !self.bridge_address.starts_with("0x") {
            return Err(eyre!(
                "{}.bridge_address must be a valid hex address (42 chars with 0x prefix)",
                label
            ));
        }

        if self.private_key.len() != 66 || !self.private_key.starts_with("0x") {
            return Err(eyre!(
                "{}.private_key must be 66 chars (0x + 64 hex chars)",
                label
            ));
        }

        Ok(())
    }
}

/// Load one chain block from `{prefix}_RPC_URL`, `{prefix}_CHAIN_ID`, etc.
fn load_chain_from_env(prefix: &str) -> Result<ChainConfig> {
    let var = |name: &str| -> Result<String> {
        let full = format!("{}_{}", prefix, name);
        env::var(&full).map_err(|_| eyre!("{} environment variable is required", full))
    };

    Ok(ChainConfig {
        rpc_url: var("RPC_URL")?,
        chain_id: var("CHAIN_ID")?
            .parse()
            .wrap_err_with(|| format!("{}_CHAIN_ID must be a valid u64", prefix))?,
        bridge_address: var("BRIDGE_ADDRESS")?,
        private_key: var("PRIVATE_KEY")?,
        reorg_window: env::var(format!("{}_REORG_WINDOW", prefix))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_reorg_window()),
        confirmation_depth: env::var(format!("{}_CONFIRMATION_DEPTH", prefix))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_confirmation_depth()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chain(chain_id: u64) -> ChainConfig {
        ChainConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id,
            bridge_address: "0x0000000000000000000000000000000000000001".to_string(),
            private_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
                .to_string(),
            reorg_window: 12,
            confirmation_depth: 6,
        }
    }

    fn sample_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite://relayer.db".to_string(),
            },
            source: sample_chain(31337),
            dest: sample_chain(31338),
            relayer: RelayerConfig {
                poll_interval_ms: 1000,
                retry_attempts: 5,
                retry_delay_ms: 2000,
                confirmation_timeout_secs: 300,
            },
        }
    }

    #[test]
    fn test_default_reorg_window() {
        assert_eq!(default_reorg_window(), 12);
    }

    #[test]
    fn test_default_confirmation_depth() {
        assert_eq!(default_confirmation_depth(), 6);
    }

    #[test]
    fn test_default_poll_interval() {
        assert_eq!(default_poll_interval(), 1000);
    }

    #[test]
    fn test_default_retry_attempts() {
        assert_eq!(default_retry_attempts(), 5);
    }

    #[test]
    fn test_default_retry_delay() {
        assert_eq!(default_retry_delay(), 2000);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_address_and_key_validation() {
        let mut config = sample_config();

        // Invalid private key length
        config.source.private_key = "0x123".to_string();
        assert!(config.validate().is_err());

        // Invalid bridge address
        config.source.private_key =
            "0x0000000000000000000000000000000000000000000000000000000000000001".to_string();
        config.dest.bridge_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_database_url_rejected() {
        let mut config = sample_config();
        config.database.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_chain_id_rejected() {
        let mut config = sample_config();
        config.dest = sample_chain(31337);

        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains("31337"),
            "Error should mention the duplicate chain ID: {}",
            err
        );
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = sample_config();
        config.relayer.retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = sample_config();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(&config.source.private_key));
        assert!(!rendered.contains(&config.database.url));
        assert!(rendered.contains("<redacted>"));
    }
}
