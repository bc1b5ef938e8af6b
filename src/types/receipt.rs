//! Transaction receipt as seen by the receipt watcher

use ethers::types::{TransactionReceipt as EthReceipt, H256, U256, U64};
use serde::{Deserialize, Serialize};

/// On-chain confirmation of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: H256,

    /// Block the transaction was included in
    pub block_number: Option<u64>,

    pub gas_used: Option<U256>,

    /// Execution status (true = success, false = reverted)
    pub status: bool,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status
    }
}

impl From<EthReceipt> for TransactionReceipt {
    fn from(receipt: EthReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
            // Pre-byzantium receipts carry no status; treat them as not successful
            status: receipt.status == Some(U64::from(1)),
        }
    }
}
