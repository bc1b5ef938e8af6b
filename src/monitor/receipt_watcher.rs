//! Transaction receipt watcher
//!
//! Polls the wallet provider for the receipt of a submitted transaction. Each poll
//! publishes `Some(receipt)` or `None`; the first receipt ends the watch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::H256;
use tracing::{debug, info, warn};

use super::{spawn_poll, PollConfig, PollHandle, PollOutcome, PollSource};
use crate::error::ClaimError;
use crate::types::TransactionReceipt;
use crate::wallet::WalletProvider;

/// Completion callback invoked with a successful receipt
pub type ReceiptCallback = Box<dyn FnOnce(&TransactionReceipt) + Send>;

/// Handle to a running receipt watch
pub type ReceiptWatch = PollHandle<Option<TransactionReceipt>>;

/// Final reading of a receipt watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptVerdict {
    /// Mined with a success status
    Succeeded(TransactionReceipt),
    /// Mined but reverted
    Failed(TransactionReceipt),
    /// No receipt before the watch stopped; the transaction may still be pending
    Inconclusive,
}

impl ReceiptVerdict {
    pub fn from_outcome(outcome: PollOutcome<Option<TransactionReceipt>>) -> Self {
        match outcome {
            PollOutcome::Completed(Some(receipt)) if receipt.succeeded() => Self::Succeeded(receipt),
            PollOutcome::Completed(Some(receipt)) => Self::Failed(receipt),
            _ => Self::Inconclusive,
        }
    }
}

struct ReceiptSource {
    wallet: Arc<dyn WalletProvider>,
    tx_hash: H256,
    on_success: Mutex<Option<ReceiptCallback>>,
}

#[async_trait]
impl PollSource for ReceiptSource {
    type Snapshot = Option<TransactionReceipt>;

    async fn fetch(&self) -> Result<Option<TransactionReceipt>, ClaimError> {
        let receipt = self.wallet.get_transaction_receipt(self.tx_hash).await?;
        if receipt.is_none() {
            debug!("No receipt yet for {:?}", self.tx_hash);
        }
        Ok(receipt)
    }

    fn is_terminal(&self, receipt: &Option<TransactionReceipt>) -> bool {
        receipt.is_some()
    }

    fn on_terminal(&self, receipt: &Option<TransactionReceipt>) {
        let Some(receipt) = receipt else { return };

        if !receipt.succeeded() {
            warn!(
                "Transaction {:?} reverted in block {:?}",
                self.tx_hash, receipt.block_number
            );
            return;
        }

        info!(
            "Transaction {:?} mined in block {:?}",
            self.tx_hash, receipt.block_number
        );
        let callback = match self.on_success.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(callback) = callback {
            callback(receipt);
        }
    }

    fn describe(&self) -> String {
        format!("receipt of {:?}", self.tx_hash)
    }
}

/// Starts receipt watches against a wallet provider
#[derive(Clone)]
pub struct ReceiptWatcher {
    wallet: Arc<dyn WalletProvider>,
    config: PollConfig,
}

impl ReceiptWatcher {
    pub fn new(wallet: Arc<dyn WalletProvider>, config: PollConfig) -> Self {
        Self { wallet, config }
    }

    /// Start watching a transaction hash
    ///
    /// `on_success` runs once, inside the watch task, when a successful receipt
    /// arrives. It is not called for reverted transactions or cancelled watches.
    pub fn watch(&self, tx_hash: H256, on_success: Option<ReceiptCallback>) -> ReceiptWatch {
        spawn_poll(
            ReceiptSource {
                wallet: self.wallet.clone(),
                tx_hash,
                on_success: Mutex::new(on_success),
            },
            self.config.clone(),
        )
    }
}
