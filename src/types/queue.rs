//! Backend work-queue messages
//!
//! Email redemptions are processed asynchronously by the backend; the request
//! returns a queue uid that is polled until the message finishes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing status of a queue message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    InProcess,
    Finish,
    FinishWithError,
    #[serde(other)]
    Unknown,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish | Self::FinishWithError)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Finish)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProcess => "IN_PROCESS",
            Self::Finish => "FINISH",
            Self::FinishWithError => "FINISH_WITH_ERROR",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueResult {
    pub tx_hash: String,
}

/// A queue entry as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub uid: String,

    #[serde(default)]
    pub operation: String,

    pub status: QueueStatus,

    #[serde(default)]
    pub result: Option<QueueResult>,
}

/// Response of a request that was queued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReceipt {
    pub queue_uid: String,
}
