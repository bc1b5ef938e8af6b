//! Error types for the claim and migration flow
//!
//! Covers:
//! - Remote claim service failures (not found, rejected, malformed)
//! - Wallet provider failures (rejection, wrong network, provider errors)
//! - Local validation of user input and configuration

use thiserror::Error;

/// Errors that can occur while tracking claims or migrating badges
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// The backend does not know the requested claim hash, token or queue message
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend rejected the request
    #[error("Service error: {0}")]
    ServiceError(String),

    /// The backend answered with something we could not interpret
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request never produced a response (connection, timeout, DNS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The user declined the wallet prompt
    #[error("User rejected the request: {0}")]
    UserRejected(String),

    /// No wallet account is available to sign with
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    /// The wallet is connected to a different network than the one configured
    #[error("Wrong network: expected chain {expected}, wallet is on chain {actual}")]
    NetworkMismatch {
        /// Configured chain id
        expected: u64,
        /// Chain id reported by the wallet
        actual: u64,
    },

    /// The wallet provider failed for any other reason
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Invalid user input (address, email, hash)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The event behind the claim can no longer be minted
    #[error("Event expired on {0}")]
    EventExpired(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClaimError {
    /// Errors a polling loop should swallow and retry on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClaimError::Transport(_) | ClaimError::ServiceError(_) | ClaimError::ProviderError(_)
        )
    }

    /// Errors the user can fix by acting in their wallet
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ClaimError::UserRejected(_)
                | ClaimError::WalletUnavailable(_)
                | ClaimError::NetworkMismatch { .. }
        )
    }

    /// Build a wallet error from a provider message, detecting user rejections
    ///
    /// Injected wallets report rejection through the error text (EIP-1193 code 4001
    /// "User denied transaction signature"), so the message is the only signal.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("user denied")
            || lower.contains("user rejected")
            || lower.contains("rejected by user")
            || lower.contains("4001")
        {
            ClaimError::UserRejected(message)
        } else {
            ClaimError::ProviderError(message)
        }
    }
}

impl From<reqwest::Error> for ClaimError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClaimError::MalformedResponse(err.to_string())
        } else {
            ClaimError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClaimError {
    fn from(err: serde_json::Error) -> Self {
        ClaimError::MalformedResponse(err.to_string())
    }
}

/// Result alias used across the crate
pub type ClaimResult<T> = std::result::Result<T, ClaimError>;
