//! Claim status poller
//!
//! Tracks a QR hash until the mint behind it passes or fails.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{spawn_poll, PollConfig, PollHandle, PollSource};
use crate::api::ClaimService;
use crate::error::ClaimError;
use crate::types::ClaimRecord;

/// Handle to a running claim poll
pub type ClaimTracker = PollHandle<ClaimRecord>;

struct ClaimSource {
    service: Arc<dyn ClaimService>,
    qr_hash: String,
}

#[async_trait]
impl PollSource for ClaimSource {
    type Snapshot = ClaimRecord;

    async fn fetch(&self) -> Result<ClaimRecord, ClaimError> {
        let claim = self.service.fetch_claim(&self.qr_hash).await?;
        debug!("Claim {} status: {}", self.qr_hash, claim.tx_status);
        Ok(claim)
    }

    fn is_terminal(&self, claim: &ClaimRecord) -> bool {
        claim.is_terminal()
    }

    fn on_terminal(&self, claim: &ClaimRecord) {
        match claim.minted_token() {
            Some(token) => info!("Claim {} minted token {}", self.qr_hash, token),
            None => info!("Claim {} finished with status {}", self.qr_hash, claim.tx_status),
        }
    }

    fn describe(&self) -> String {
        format!("claim {}", self.qr_hash)
    }
}

/// Starts claim polls against a claim service
#[derive(Clone)]
pub struct ClaimStatusPoller {
    service: Arc<dyn ClaimService>,
    config: PollConfig,
}

impl ClaimStatusPoller {
    pub fn new(service: Arc<dyn ClaimService>, config: PollConfig) -> Self {
        Self { service, config }
    }

    /// Start polling a claim hash
    ///
    /// The first fetch is issued immediately. Every record is published on the
    /// returned handle; the loop stops after publishing a `passed` or `failed`
    /// record. Tracking the same hash again starts a fresh loop.
    pub fn track(&self, qr_hash: &str) -> ClaimTracker {
        spawn_poll(
            ClaimSource {
                service: self.service.clone(),
                qr_hash: qr_hash.to_string(),
            },
            self.config.clone(),
        )
    }
}
