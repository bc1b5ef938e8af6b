/// Configuration module for badge-claim
///
/// This module defines the configuration structures used by the claim poller,
/// the migration orchestrator and the wallet adapter, plus the `ConfigManager`
/// that loads them from a YAML file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{ClaimError, ClaimResult};
use crate::monitor::PollConfig;

/// Environment variable overriding `api.base_url`
pub const API_ROOT_ENV: &str = "BADGE_API_ROOT";

/// Environment variable overriding `chain.rpc_url`
pub const RPC_URL_ENV: &str = "BADGE_RPC_URL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    /// General settings
    pub general: GeneralConfig,

    /// Claim service API
    pub api: ApiConfig,

    /// Canonical chain the migration mints on
    pub chain: ChainConfig,

    /// Poll intervals and retry bound
    pub polling: PollingConfig,

    /// Gas limit policy for the mint call
    pub gas: GasConfig,

    /// Block explorer networks
    pub explorer: ExplorerConfig,
}

impl ClaimConfig {
    /// Apply `BADGE_API_ROOT` / `BADGE_RPC_URL` on top of the file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(API_ROOT_ENV) {
            if !root.trim().is_empty() {
                info!("Using API root from {}", API_ROOT_ENV);
                self.api.base_url = root.trim().to_string();
            }
        }
        if let Ok(rpc) = std::env::var(RPC_URL_ENV) {
            if !rpc.trim().is_empty() {
                info!("Using RPC endpoint from {}", RPC_URL_ENV);
                self.chain.rpc_url = rpc.trim().to_string();
            }
        }
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Claim service API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root, e.g. `https://api.poap.xyz`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Canonical chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Network name shown to the user when the wallet is on the wrong chain
    pub network_name: String,

    /// Chain id the wallet must be connected to
    pub chain_id: u64,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Address of the delegated mint contract
    pub mint_delegate_contract: String,

    /// Name of the environment variable holding the signer private key
    pub signer_key_env: String,
}

impl ChainConfig {
    /// Delegated mint contract, `None` while it is not configured
    pub fn contract_address(&self) -> ClaimResult<Option<Address>> {
        let raw = self.mint_delegate_contract.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(|_| {
            ClaimError::Config(format!(
                "chain.mint_delegate_contract is not an address: {}",
                self.mint_delegate_contract
            ))
        })
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network_name: "mainnet".to_string(),
            chain_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            mint_delegate_contract: String::new(),
            signer_key_env: "BADGE_SIGNER_KEY".to_string(),
        }
    }
}

/// Poll intervals and retry bound
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between claim fetches
    pub claim_interval_ms: u64,

    /// Delay between receipt polls
    pub receipt_interval_ms: u64,

    /// Delay between queue message fetches
    pub queue_interval_ms: u64,

    /// Consecutive fetch failures before a poller gives up (0 = never)
    pub max_consecutive_errors: u32,
}

impl PollingConfig {
    fn error_bound(&self) -> Option<u32> {
        match self.max_consecutive_errors {
            0 => None,
            n => Some(n),
        }
    }

    /// Claims are fetched immediately, then after each interval
    pub fn claim_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.claim_interval_ms),
            poll_immediately: true,
            max_consecutive_errors: self.error_bound(),
        }
    }

    /// Receipts are first polled one interval after the transaction is sent
    pub fn receipt_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.receipt_interval_ms),
            poll_immediately: false,
            max_consecutive_errors: self.error_bound(),
        }
    }

    pub fn queue_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.queue_interval_ms),
            poll_immediately: true,
            max_consecutive_errors: self.error_bound(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            claim_interval_ms: 5_000,
            receipt_interval_ms: 3_000,
            queue_interval_ms: 5_000,
            max_consecutive_errors: 12,
        }
    }
}

/// Gas limit policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Limit used when estimation fails, before the margin
    pub fallback_limit: u64,

    /// Margin applied to the limit, in percent (130 = 1.3x)
    pub margin_percent: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            fallback_limit: 1_000_000,
            margin_percent: 130,
        }
    }
}

/// Block explorer networks
///
/// Layer one links go to etherscan (empty network = mainnet), layer two links to
/// blockscout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub layer_one_network: String,
    pub layer_two_network: String,
}

impl ExplorerConfig {
    fn etherscan_root(&self) -> String {
        match self.layer_one_network.trim() {
            "" | "mainnet" => "https://etherscan.io".to_string(),
            network => format!("https://{}.etherscan.io", network),
        }
    }

    fn blockscout_root(&self) -> String {
        format!("https://blockscout.com/poa/{}", self.layer_two_network.trim())
    }

    pub fn layer_one_tx(&self, tx_hash: H256) -> String {
        format!("{}/tx/{:?}", self.etherscan_root(), tx_hash)
    }

    pub fn layer_one_address(&self, address: Address) -> String {
        format!("{}/address/{:?}", self.etherscan_root(), address)
    }

    pub fn layer_two_tx(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.blockscout_root(), tx_hash)
    }

    pub fn layer_two_address(&self, address: &str) -> String {
        format!("{}/address/{}", self.blockscout_root(), address)
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            layer_one_network: String::new(),
            layer_two_network: "xdai".to_string(),
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    /// Current configuration
    config: RwLock<ClaimConfig>,

    /// Configuration file path
    pub config_path: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new(config_path: &str) -> Self {
        Self {
            config: RwLock::new(ClaimConfig::default()),
            config_path: config_path.to_string(),
        }
    }

    /// Load configuration from file, then apply environment overrides
    pub async fn load(&self) -> Result<()> {
        let path = Path::new(&self.config_path);

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file: {}", self.config_path))?;
            let config: ClaimConfig =
                serde_yaml::from_str(&content).context("Failed to parse configuration file")?;
            info!("Configuration loaded from {}", self.config_path);
            config
        } else {
            warn!("Configuration file {} not found, using defaults", self.config_path);
            ClaimConfig::default()
        };

        config.apply_env_overrides();
        *self.config.write().await = config;
        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        let yaml = serde_yaml::to_string(&*config).context("Failed to serialize configuration")?;

        let path = Path::new(&self.config_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        fs::write(path, yaml)
            .with_context(|| format!("Failed to write configuration to file: {}", self.config_path))?;

        info!("Configuration saved to {}", self.config_path);
        Ok(())
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> ClaimConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration and persist it
    pub async fn update_config(&self, config: ClaimConfig) -> Result<()> {
        *self.config.write().await = config;
        self.save().await
    }
}
