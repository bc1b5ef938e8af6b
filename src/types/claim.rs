//! Claim record types
//!
//! This module defines the `ClaimRecord` returned by the claim service for a QR hash,
//! together with the `TxStatus` of the mint transaction behind it.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{ClaimError, ClaimResult};

/// Date format used by the backend for event dates (`12-Mar-2021`)
pub const EVENT_DATE_FORMAT: &str = "%d-%b-%Y";

/// Status of the mint transaction behind a claim
///
/// The backend sends a plain string which may be missing, null or empty while the
/// claim has not been picked up yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum TxStatus {
    /// No transaction yet (missing, null or empty string)
    #[default]
    None,
    /// Transaction submitted, not mined
    Pending,
    /// Transaction re-submitted with a higher gas price, not mined
    Bumped,
    /// Transaction mined successfully
    Passed,
    /// Transaction failed
    Failed,
    /// Any status this client does not know about
    Other(String),
}

impl TxStatus {
    /// Check if the status is final (passed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "",
            Self::Pending => "pending",
            Self::Bumped => "bumped",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for TxStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        Ok(match raw.to_lowercase().as_str() {
            "" => Self::None,
            "pending" => Self::Pending,
            "bumped" => Self::Bumped,
            "passed" => Self::Passed,
            "failed" => Self::Failed,
            _ => {
                warn!("Unknown transaction status from backend: {}", raw);
                Self::Other(raw.to_string())
            }
        })
    }
}

impl From<Option<String>> for TxStatus {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => s.parse().unwrap_or_default(),
            None => Self::None,
        }
    }
}

impl From<TxStatus> for Option<String> {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::None => None,
            other => Some(other.as_str().to_string()),
        }
    }
}

/// Summary of the event a claim or token belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    /// Last day the event's badges can be minted, `dd-Mon-yyyy`
    #[serde(default)]
    pub expiry_date: Option<String>,
}

impl EventSummary {
    /// Parse the expiry date, if the backend sent one
    pub fn expiry(&self) -> ClaimResult<Option<NaiveDate>> {
        match self.expiry_date.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, EVENT_DATE_FORMAT)
                .map(Some)
                .map_err(|e| {
                    ClaimError::MalformedResponse(format!("invalid expiry date {}: {}", raw, e))
                }),
        }
    }

    /// An event is expired from the start of its expiry date
    pub fn is_expired(&self, today: NaiveDate) -> ClaimResult<bool> {
        Ok(matches!(self.expiry()?, Some(expiry) if expiry <= today))
    }
}

/// Result attached to a claim once the mint went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintResult {
    pub token: u64,
}

/// A claimable badge grant identified by its QR hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub qr_hash: String,

    pub event_id: u64,

    #[serde(default)]
    pub event: Option<EventSummary>,

    #[serde(default)]
    pub beneficiary: Option<String>,

    /// What the user typed: an address, an ENS name or an email
    #[serde(default)]
    pub user_input: Option<String>,

    #[serde(default)]
    pub claimed: bool,

    #[serde(default)]
    pub tx_status: TxStatus,

    #[serde(default)]
    pub result: Option<MintResult>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub tx_hash: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub delegated_mint: bool,
}

impl ClaimRecord {
    pub fn is_terminal(&self) -> bool {
        self.tx_status.is_terminal()
    }

    /// Token id of the minted badge
    ///
    /// Only reported once the status is `passed`; a token attached to any other
    /// status is ignored.
    pub fn minted_token(&self) -> Option<u64> {
        match (&self.tx_status, &self.result) {
            (TxStatus::Passed, Some(result)) => Some(result.token),
            _ => None,
        }
    }

    /// True when the backend attached a token to a claim that has not passed
    pub fn has_inconsistent_result(&self) -> bool {
        self.result.is_some() && self.tx_status != TxStatus::Passed
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
