//! Claim submission flow
//!
//! Turns a QR hash and what the user typed into a claimed badge, and optionally
//! into a canonical-chain migration once the low-fee mint has passed.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use ethers::types::Address;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::api::ClaimService;
use crate::error::{ClaimError, ClaimResult};
use crate::migration::{MigrationOrchestrator, MigrationOutcome};
use crate::monitor::{ClaimStatusPoller, PollOutcome, QueueWatcher};
use crate::notifications::{Notification, Notifier};
use crate::types::{ClaimRecord, QueueMessage};

static ADDRESS_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$"));

static ENS_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+eth$"));

static EMAIL_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$")
});

fn is_match(pattern: &Lazy<Result<Regex, regex::Error>>, input: &str) -> bool {
    match pattern.as_ref() {
        Ok(re) => re.is_match(input),
        Err(e) => {
            warn!("Failed to compile input pattern: {}", e);
            false
        }
    }
}

/// Who receives a claimed badge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Beneficiary {
    Address(Address),
    Ens(String),
    Email(String),
}

impl Beneficiary {
    /// Classify user input as an address, ENS name or email
    pub fn parse(input: &str) -> ClaimResult<Self> {
        let input = input.trim();
        if is_match(&ADDRESS_RE, input) {
            let address = input
                .parse()
                .map_err(|_| ClaimError::InvalidInput(format!("invalid address: {}", input)))?;
            Ok(Self::Address(address))
        } else if is_match(&ENS_RE, input) {
            Ok(Self::Ens(input.to_lowercase()))
        } else if is_match(&EMAIL_RE, input) {
            Ok(Self::Email(input.to_lowercase()))
        } else {
            Err(ClaimError::InvalidInput(format!(
                "{} is not an address, ENS name or email",
                input
            )))
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, Self::Email(_))
    }

    /// Canonical-chain minting needs a wallet, which an email claim does not have
    pub fn can_migrate(&self) -> bool {
        !self.is_email()
    }
}

impl fmt::Display for Beneficiary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{:?}", address),
            Self::Ens(name) => write!(f, "{}", name),
            Self::Email(email) => write!(f, "{}", email),
        }
    }
}

/// Result of a claim submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Claim accepted; the backend mints on the low-fee layer
    Submitted(ClaimRecord),
    /// Claim tracked until its mint passed or failed, then migrated if requested
    Tracked {
        claim: ClaimRecord,
        migration: Option<MigrationOutcome>,
    },
    /// Tracking stopped before the mint reached a final status
    Unresolved { qr_hash: String, reason: Option<ClaimError> },
}

/// Claim, track and migrate
pub struct ClaimFlow {
    service: Arc<dyn ClaimService>,
    poller: ClaimStatusPoller,
    queue: QueueWatcher,
    orchestrator: MigrationOrchestrator,
    notifier: Arc<dyn Notifier>,
}

impl ClaimFlow {
    pub fn new(
        service: Arc<dyn ClaimService>,
        poller: ClaimStatusPoller,
        queue: QueueWatcher,
        orchestrator: MigrationOrchestrator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            service,
            poller,
            queue,
            orchestrator,
            notifier,
        }
    }

    /// Claim a QR hash for `input`
    ///
    /// With `migrate` set (ignored for email input) the claim is tracked until the
    /// backend mint passes, then its token is migrated to the canonical chain.
    pub async fn claim(
        &self,
        qr_hash: &str,
        input: &str,
        migrate: bool,
        today: NaiveDate,
    ) -> ClaimResult<ClaimOutcome> {
        let qr_hash = qr_hash.trim().to_lowercase();
        let beneficiary = Beneficiary::parse(input)?;

        let current = self.service.fetch_claim(&qr_hash).await?;
        if current.claimed {
            return Err(ClaimError::InvalidInput(format!(
                "claim {} was already redeemed",
                qr_hash
            )));
        }
        if let Some(event) = &current.event {
            if event.is_expired(today)? {
                let expiry = event.expiry_date.clone().unwrap_or_default();
                self.notifier
                    .notify(Notification::error(
                        "This badge can't be minted because it's been too long since the event finished",
                    ))
                    .await;
                return Err(ClaimError::EventExpired(expiry));
            }
        }
        let secret = current.secret.as_deref().ok_or_else(|| {
            ClaimError::MalformedResponse(format!("claim {} has no secret", qr_hash))
        })?;

        let submitted = match self
            .service
            .submit_claim(&qr_hash, &beneficiary.to_string().to_lowercase(), secret)
            .await
        {
            Ok(claim) => claim,
            Err(e) => {
                self.notifier
                    .notify(Notification::error(format!("Badge couldn't be claimed: {}", e)))
                    .await;
                return Err(e);
            }
        };
        info!("Claim {} submitted for {}", qr_hash, beneficiary);
        self.notifier
            .notify(Notification::info(format!("Badge claimed for {}", beneficiary)))
            .await;

        if !migrate {
            return Ok(ClaimOutcome::Submitted(submitted));
        }
        if !beneficiary.can_migrate() {
            warn!("Migration is not available for email claims, skipping for {}", qr_hash);
            return Ok(ClaimOutcome::Submitted(submitted));
        }

        let claim = match self.poller.track(&qr_hash).outcome().await {
            PollOutcome::Completed(claim) => claim,
            PollOutcome::GaveUp(e) => {
                return Ok(ClaimOutcome::Unresolved {
                    qr_hash,
                    reason: Some(e),
                })
            }
            PollOutcome::Cancelled => return Ok(ClaimOutcome::Unresolved { qr_hash, reason: None }),
        };

        let migration = match claim.minted_token() {
            Some(_) => Some(self.orchestrator.migrate_claim(&claim)?.outcome().await),
            None => {
                warn!("Claim {} ended as {}, nothing to migrate", qr_hash, claim.tx_status);
                self.notifier
                    .notify(Notification::error(format!(
                        "The mint of claim {} failed, nothing to migrate",
                        qr_hash
                    )))
                    .await;
                None
            }
        };

        Ok(ClaimOutcome::Tracked { claim, migration })
    }

    /// Redeem the badges sent to an email address into a wallet address
    ///
    /// Returns the final queue message (`FINISH` or `FINISH_WITH_ERROR`).
    pub async fn redeem_email(&self, email: &str, address: &str, token: &str) -> ClaimResult<QueueMessage> {
        let email = match Beneficiary::parse(email)? {
            Beneficiary::Email(email) => email,
            other => {
                return Err(ClaimError::InvalidInput(format!("{} is not an email", other)));
            }
        };
        let address = match Beneficiary::parse(address)? {
            Beneficiary::Email(_) => {
                return Err(ClaimError::InvalidInput(
                    "badges can only be redeemed to an address or ENS name".into(),
                ));
            }
            other => other.to_string(),
        };

        let receipt = self.service.redeem_with_email(&email, &address, token).await?;
        info!("Email redemption for {} queued as {}", email, receipt.queue_uid);

        match self.queue.track(&receipt.queue_uid).outcome().await {
            PollOutcome::Completed(message) => {
                let notification = if message.status.is_successful() {
                    Notification::success(format!("Badges of {} redeemed to {}", email, address))
                } else {
                    Notification::action_required(format!(
                        "Redeeming the badges of {} failed, please try again",
                        email
                    ))
                };
                self.notifier.notify(notification).await;
                Ok(message)
            }
            PollOutcome::GaveUp(e) => Err(e),
            PollOutcome::Cancelled => Err(ClaimError::ServiceError(format!(
                "tracking of queue message {} was cancelled",
                receipt.queue_uid
            ))),
        }
    }
}
