//! Remote claim service
//!
//! The claim service owns every claim, token and queue record; this crate only
//! reads them and asks for migration signatures.

pub mod http;

use async_trait::async_trait;

use crate::error::ClaimResult;
use crate::types::{ClaimRecord, EnsLookup, MigrationSignature, QueueMessage, QueueReceipt, TokenInfo};

pub use http::HttpClaimService;

/// Claim service client trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClaimService: Send + Sync + 'static {
    /// Fetch the claim behind a QR hash
    ///
    /// # Errors
    /// * `ClaimError::NotFound` if the hash is unknown
    async fn fetch_claim(&self, qr_hash: &str) -> ClaimResult<ClaimRecord>;

    /// Claim a QR hash for an address, ENS name or email
    async fn submit_claim(&self, qr_hash: &str, address: &str, secret: &str) -> ClaimResult<ClaimRecord>;

    /// Ask the backend to authorize a canonical-chain mint for a token
    ///
    /// # Errors
    /// * `ClaimError::ServiceError` if the backend refuses
    async fn request_migration_signature(&self, token_id: u64) -> ClaimResult<MigrationSignature>;

    /// Look up a token by id
    async fn fetch_token(&self, token_id: u64) -> ClaimResult<TokenInfo>;

    /// Tokens held by an address or email
    async fn fetch_tokens_for(&self, account: &str) -> ClaimResult<Vec<TokenInfo>>;

    /// Resolve an ENS name to an address
    async fn resolve_ens(&self, name: &str) -> ClaimResult<EnsLookup>;

    /// Reverse lookup of the ENS name of an address
    async fn lookup_ens(&self, address: &str) -> ClaimResult<EnsLookup>;

    /// Redeem the badges held by an email address to a wallet address
    async fn redeem_with_email(&self, email: &str, address: &str, token: &str) -> ClaimResult<QueueReceipt>;

    /// Fetch a backend queue message
    async fn fetch_queue_message(&self, uid: &str) -> ClaimResult<QueueMessage>;
}
