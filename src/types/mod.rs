//! # Claim Types Module
//!
//! Data exchanged with the claim service and the wallet provider.

pub mod claim;
pub mod collection;
pub mod migration;
pub mod queue;
pub mod receipt;

pub use claim::{ClaimRecord, EventSummary, MintResult, TxStatus, EVENT_DATE_FORMAT};
pub use collection::{Collection, EnsLookup, OwnedToken};
pub use migration::{parse_address, MigrationSignature, MintTarget, TokenInfo, LOW_FEE_LAYER};
pub use queue::{QueueMessage, QueueReceipt, QueueResult, QueueStatus};
pub use receipt::TransactionReceipt;
