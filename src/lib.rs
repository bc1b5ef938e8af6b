//! Badge Claim Library
//!
//! Tracks badge claims made with QR hashes, migrates minted badges to the
//! canonical chain through a delegated mint contract, and watches the resulting
//! transactions until they are mined. Collections held by an address, ENS name or
//! email can be browsed as well.
//!
//! The claim service (REST backend) and the wallet are external collaborators
//! reached through the `ClaimService` and `WalletProvider` traits.

pub mod api;
pub mod claim;
pub mod collection;
pub mod config;
pub mod error;
pub mod migration;
pub mod monitor;
pub mod notifications;
pub mod types;
pub mod wallet;

pub use crate::claim::{Beneficiary, ClaimFlow, ClaimOutcome};
pub use crate::collection::CollectionBrowser;
pub use crate::error::{ClaimError, ClaimResult};
pub use crate::migration::{MigrationHandle, MigrationOrchestrator, MigrationOutcome, MigrationState};
pub use crate::monitor::{ClaimStatusPoller, PollOutcome, QueueWatcher, ReceiptVerdict, ReceiptWatcher};

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{ClaimService, HttpClaimService};
use crate::config::ClaimConfig;
use crate::migration::MigrationSettings;
use crate::notifications::Notifier;
use crate::wallet::{EthersWallet, WalletProvider, WalletSessionManager};

/// Application state wiring the claim components together
///
/// Every component shares the same claim service, wallet session and notifier.
pub struct AppState {
    pub config: ClaimConfig,
    pub service: Arc<dyn ClaimService>,
    pub wallet: Arc<WalletSessionManager>,
    pub notifier: Arc<dyn Notifier>,
    pub poller: ClaimStatusPoller,
    pub queue: QueueWatcher,
    pub receipts: ReceiptWatcher,
    pub orchestrator: MigrationOrchestrator,
}

impl AppState {
    /// Build the state from explicit collaborators
    pub fn new(
        config: ClaimConfig,
        service: Arc<dyn ClaimService>,
        wallet: Arc<dyn WalletProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> ClaimResult<Self> {
        let settings = MigrationSettings::from_config(&config)?;
        let sessions = Arc::new(WalletSessionManager::new(wallet.clone(), config.chain.chain_id));

        Ok(Self {
            poller: ClaimStatusPoller::new(service.clone(), config.polling.claim_poll()),
            queue: QueueWatcher::new(service.clone(), config.polling.queue_poll()),
            receipts: ReceiptWatcher::new(wallet, config.polling.receipt_poll()),
            orchestrator: MigrationOrchestrator::new(
                service.clone(),
                sessions.clone(),
                notifier.clone(),
                settings,
            ),
            config,
            service,
            wallet: sessions,
            notifier,
        })
    }

    /// Build the state with the HTTP claim service and the `ethers` wallet
    pub fn from_config(config: ClaimConfig, notifier: Arc<dyn Notifier>) -> ClaimResult<Self> {
        let service = Arc::new(HttpClaimService::new(&config.api)?);
        let wallet = Arc::new(EthersWallet::from_config(&config.chain)?);
        Self::new(config, service, wallet, notifier)
    }

    /// Claim flow over the shared components
    pub fn claim_flow(&self) -> ClaimFlow {
        ClaimFlow::new(
            self.service.clone(),
            self.poller.clone(),
            self.queue.clone(),
            self.orchestrator.clone(),
            self.notifier.clone(),
        )
    }

    /// Collection browser over the shared claim service
    pub fn collections(&self) -> CollectionBrowser {
        CollectionBrowser::new(self.service.clone())
    }
}

/// Initialize logging with the given default level
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    info!("Logging initialized at {} level", level);
    Ok(())
}

/// Version information
pub mod version {
    /// Current version from Cargo.toml
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Get a greeting message with version info
pub fn greeting() -> String {
    format!("badge-claim v{}", version::VERSION)
}
