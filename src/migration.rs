//! Migration orchestrator
//!
//! Moves a badge minted on the low-fee layer to the canonical chain:
//!
//! ```text
//! idle -> requesting signature -> awaiting wallet -> submitting -> pending receipt
//!                                                                   -> succeeded | failed
//! ```
//!
//! Any step can end in `failed` (signature refused, wrong network, user rejection).
//! Gas estimation failures fall back to a fixed limit and never stop the flow.
//! Every terminal state is reported to the `Notifier`.

use std::fmt;
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ClaimService;
use crate::config::{ClaimConfig, ExplorerConfig, GasConfig};
use crate::error::{ClaimError, ClaimResult};
use crate::monitor::{PollConfig, ReceiptVerdict, ReceiptWatcher};
use crate::notifications::{Notification, Notifier};
use crate::types::{ClaimRecord, MintTarget, TransactionReceipt};
use crate::wallet::{ContractCall, WalletSessionManager};

pub const SUBMIT_ERROR_MESSAGE: &str = "Error while trying to submit transaction. Please try again.";
pub const REVERTED_MESSAGE: &str = "It seems that your transaction failed. Please refresh the page";

/// Migration state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Idle,
    RequestingSignature,
    AwaitingWallet,
    Submitting,
    PendingReceipt { tx_hash: H256 },
    Succeeded { receipt: TransactionReceipt },
    Failed { reason: ClaimError },
}

impl MigrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RequestingSignature => write!(f, "requesting signature"),
            Self::AwaitingWallet => write!(f, "awaiting wallet"),
            Self::Submitting => write!(f, "submitting"),
            Self::PendingReceipt { tx_hash } => write!(f, "pending receipt for {:?}", tx_hash),
            Self::Succeeded { .. } => write!(f, "succeeded"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// How a migration run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Succeeded(TransactionReceipt),
    Failed(ClaimError),
    /// The transaction was sent but no receipt was observed
    Inconclusive { tx_hash: H256 },
    /// Cancelled before a transaction was sent
    Cancelled,
}

/// Gas limit for the mint call: the estimate (or the fallback) times the margin,
/// rounded down
pub fn gas_limit(estimate: Option<U256>, gas: &GasConfig) -> U256 {
    let base = estimate.unwrap_or_else(|| U256::from(gas.fallback_limit));
    base * U256::from(gas.margin_percent) / U256::from(100u64)
}

/// Static settings of the orchestrator
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Delegated mint contract; migrations fail with a config error while unset
    pub contract: Option<Address>,
    pub network_name: String,
    pub gas: GasConfig,
    pub receipt_poll: PollConfig,
    pub explorer: ExplorerConfig,
}

impl MigrationSettings {
    pub fn from_config(config: &ClaimConfig) -> ClaimResult<Self> {
        Ok(Self {
            contract: config.chain.contract_address()?,
            network_name: config.chain.network_name.clone(),
            gas: config.gas,
            receipt_poll: config.polling.receipt_poll(),
            explorer: config.explorer.clone(),
        })
    }
}

/// Handle to a running migration
///
/// Dropping the handle cancels the migration.
pub struct MigrationHandle {
    state: watch::Receiver<MigrationState>,
    transitions: mpsc::UnboundedReceiver<MigrationState>,
    token: CancellationToken,
    task: Option<JoinHandle<MigrationOutcome>>,
}

impl MigrationHandle {
    /// Latest state
    pub fn state(&self) -> MigrationState {
        self.state.borrow().clone()
    }

    /// Next state transition, `None` once the run has ended
    pub async fn next_transition(&mut self) -> Option<MigrationState> {
        self.transitions.recv().await
    }

    /// Stop the migration; safe to call repeatedly
    ///
    /// A transaction already sent is not recalled, the run reports it as inconclusive.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancelling migration");
            self.token.cancel();
        }
    }

    pub async fn outcome(mut self) -> MigrationOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!("Migration task aborted: {}", e);
                MigrationOutcome::Cancelled
            }),
            None => MigrationOutcome::Cancelled,
        }
    }
}

impl Drop for MigrationHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Publishes state transitions to the handle
struct StateReporter {
    state: watch::Sender<MigrationState>,
    transitions: mpsc::UnboundedSender<MigrationState>,
    label: String,
}

impl StateReporter {
    fn set(&self, next: MigrationState) {
        debug!("Migration of {} -> {}", self.label, next);
        self.state.send_replace(next.clone());
        let _ = self.transitions.send(next);
    }
}

/// Where the mint target comes from
enum TargetSource {
    Known(MintTarget),
    Token(u64),
}

/// Runs migrations
#[derive(Clone)]
pub struct MigrationOrchestrator {
    service: Arc<dyn ClaimService>,
    wallet: Arc<WalletSessionManager>,
    notifier: Arc<dyn Notifier>,
    settings: MigrationSettings,
}

impl MigrationOrchestrator {
    pub fn new(
        service: Arc<dyn ClaimService>,
        wallet: Arc<WalletSessionManager>,
        notifier: Arc<dyn Notifier>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            service,
            wallet,
            notifier,
            settings,
        }
    }

    /// Migrate an already-minted token, resolving its event and owner first
    pub fn request_migration(&self, token_id: u64) -> MigrationHandle {
        self.start(format!("token {}", token_id), TargetSource::Token(token_id))
    }

    /// Migrate the token of a claim whose mint has passed
    pub fn migrate_claim(&self, claim: &ClaimRecord) -> ClaimResult<MigrationHandle> {
        let target = MintTarget::from_claim(claim)?;
        Ok(self.migrate(target))
    }

    /// Migrate a known mint target
    pub fn migrate(&self, target: MintTarget) -> MigrationHandle {
        self.start(format!("token {}", target.token_id), TargetSource::Known(target))
    }

    fn start(&self, label: String, source: TargetSource) -> MigrationHandle {
        let (state_tx, state_rx) = watch::channel(MigrationState::Idle);
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let reporter = StateReporter {
            state: state_tx,
            transitions: transitions_tx,
            label,
        };
        let task = tokio::spawn(self.clone().run(source, reporter, token.clone()));

        MigrationHandle {
            state: state_rx,
            transitions: transitions_rx,
            token,
            task: Some(task),
        }
    }

    async fn run(self, source: TargetSource, reporter: StateReporter, token: CancellationToken) -> MigrationOutcome {
        reporter.set(MigrationState::RequestingSignature);

        let contract = match self.settings.contract {
            Some(contract) => contract,
            None => {
                let reason = ClaimError::Config("chain.mint_delegate_contract is not set".into());
                return self.fail(&reporter, reason).await;
            }
        };

        let target = match source {
            TargetSource::Known(target) => target,
            TargetSource::Token(token_id) => {
                match self.service.fetch_token(token_id).await.and_then(|t| MintTarget::from_token(&t)) {
                    Ok(target) => target,
                    Err(e) => return self.fail(&reporter, e).await,
                }
            }
        };
        if token.is_cancelled() {
            return MigrationOutcome::Cancelled;
        }

        info!(
            "Requesting migration signature for token {} of event {}",
            target.token_id, target.event_id
        );
        let signature = match self
            .service
            .request_migration_signature(target.token_id)
            .await
            .and_then(|s| s.to_bytes())
        {
            Ok(signature) => signature,
            Err(e) => return self.fail(&reporter, e).await,
        };
        if token.is_cancelled() {
            return MigrationOutcome::Cancelled;
        }

        reporter.set(MigrationState::AwaitingWallet);
        let account = match self.wallet.session().await.and_then(|s| {
            s.usable_account(self.wallet.expected_chain_id())
        }) {
            Ok(account) => account,
            Err(e) => return self.fail(&reporter, e).await,
        };
        if token.is_cancelled() {
            return MigrationOutcome::Cancelled;
        }

        reporter.set(MigrationState::Submitting);
        let provider = self.wallet.provider();
        let call = ContractCall::mint_token(contract, account, &target, signature);

        let estimate = match provider.estimate_gas(&call).await {
            Ok(estimate) => Some(estimate),
            Err(e) => {
                warn!(
                    "Gas estimation for token {} failed, using fallback {}: {}",
                    target.token_id, self.settings.gas.fallback_limit, e
                );
                None
            }
        };
        let gas = gas_limit(estimate, &self.settings.gas);
        if token.is_cancelled() {
            return MigrationOutcome::Cancelled;
        }

        let tx_hash = match provider.send_transaction(&call, gas).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => return self.fail(&reporter, e).await,
        };
        info!("Migration of token {} sent as {:?}", target.token_id, tx_hash);
        reporter.set(MigrationState::PendingReceipt { tx_hash });

        let watcher = ReceiptWatcher::new(provider, self.settings.receipt_poll.clone());
        let receipt_watch = watcher.watch(tx_hash, None);
        let verdict = tokio::select! {
            outcome = receipt_watch.outcome() => ReceiptVerdict::from_outcome(outcome),
            _ = token.cancelled() => ReceiptVerdict::Inconclusive,
        };

        match verdict {
            ReceiptVerdict::Succeeded(receipt) => {
                info!(
                    "Token {} migrated in block {:?}",
                    target.token_id, receipt.block_number
                );
                self.notifier
                    .notify(Notification::success(format!(
                        "Badge {} minted on {}: {}",
                        target.token_id,
                        self.settings.network_name,
                        self.settings.explorer.layer_one_tx(tx_hash)
                    )))
                    .await;
                reporter.set(MigrationState::Succeeded { receipt: receipt.clone() });
                MigrationOutcome::Succeeded(receipt)
            }
            ReceiptVerdict::Failed(_) => {
                let reason = ClaimError::ProviderError(format!("transaction {:?} reverted", tx_hash));
                self.fail_with(&reporter, reason, Notification::action_required(REVERTED_MESSAGE))
                    .await
            }
            ReceiptVerdict::Inconclusive => {
                warn!(
                    "No receipt observed for {:?}; migration of token {} still pending",
                    tx_hash, target.token_id
                );
                MigrationOutcome::Inconclusive { tx_hash }
            }
        }
    }

    async fn fail(&self, reporter: &StateReporter, reason: ClaimError) -> MigrationOutcome {
        let notification = self.failure_notification(&reason);
        self.fail_with(reporter, reason, notification).await
    }

    async fn fail_with(
        &self,
        reporter: &StateReporter,
        reason: ClaimError,
        notification: Notification,
    ) -> MigrationOutcome {
        error!("Migration of {} failed: {}", reporter.label, reason);
        self.notifier.notify(notification).await;
        reporter.set(MigrationState::Failed { reason: reason.clone() });
        MigrationOutcome::Failed(reason)
    }

    fn failure_notification(&self, reason: &ClaimError) -> Notification {
        match reason {
            ClaimError::NetworkMismatch { .. } => Notification::action_required(format!(
                "Wrong network, please connect to {}.",
                self.settings.network_name
            )),
            ClaimError::WalletUnavailable(_) => {
                Notification::action_required("Please connect your wallet to continue.")
            }
            ClaimError::UserRejected(_) | ClaimError::ProviderError(_) => {
                Notification::action_required(SUBMIT_ERROR_MESSAGE)
            }
            other => Notification::error(format!("Migration failed: {}", other)),
        }
    }
}
