//! Wallet session service
//!
//! Holds the lazily acquired wallet session. Prompts are serialized behind an
//! async mutex so concurrent migrations never open two connection requests.

use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::WalletProvider;
use crate::error::{ClaimError, ClaimResult};

/// Result of connecting to the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    /// Selected account, `None` when the wallet exposed no account
    pub account: Option<Address>,

    /// Chain id the wallet is connected to
    pub chain_id: u64,

    /// Set when `chain_id` differs from the expected chain
    pub network_error: bool,
}

impl WalletSession {
    /// Account to sign with, if the session is usable on the expected chain
    pub fn usable_account(&self, expected_chain_id: u64) -> ClaimResult<Address> {
        if self.network_error {
            return Err(ClaimError::NetworkMismatch {
                expected: expected_chain_id,
                actual: self.chain_id,
            });
        }
        self.account
            .ok_or_else(|| ClaimError::WalletUnavailable("no account connected".into()))
    }
}

/// Lazily connects to the wallet and reuses the session while it is valid
pub struct WalletSessionManager {
    provider: Arc<dyn WalletProvider>,
    expected_chain_id: u64,
    session: Mutex<Option<WalletSession>>,
}

impl WalletSessionManager {
    pub fn new(provider: Arc<dyn WalletProvider>, expected_chain_id: u64) -> Self {
        Self {
            provider,
            expected_chain_id,
            session: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> Arc<dyn WalletProvider> {
        self.provider.clone()
    }

    pub fn expected_chain_id(&self) -> u64 {
        self.expected_chain_id
    }

    /// Current session, connecting if none is cached
    ///
    /// Only sessions with an account on the expected chain are cached; anything
    /// else is returned as-is and the next call prompts again.
    pub async fn session(&self) -> ClaimResult<WalletSession> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            debug!("Reusing wallet session on chain {}", session.chain_id);
            return Ok(session.clone());
        }

        let chain_id = self.provider.connect().await?;
        let account = self.provider.get_accounts().await?.into_iter().next();

        let session = WalletSession {
            account,
            chain_id,
            network_error: chain_id != self.expected_chain_id,
        };

        if session.network_error {
            warn!(
                "Wallet connected to chain {}, expected {}",
                chain_id, self.expected_chain_id
            );
        } else if let Some(account) = session.account {
            info!("Wallet session opened for {:?} on chain {}", account, chain_id);
            *cached = Some(session.clone());
        } else {
            warn!("Wallet connected without exposing an account");
        }

        Ok(session)
    }
}
