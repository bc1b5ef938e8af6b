//! Migration types
//!
//! A migration mints an already-issued badge on the canonical chain through the
//! delegated mint contract, authorized by a signature from the claim service.

use std::str::FromStr;

use ethers::types::{Address, Bytes};
use serde::{Deserialize, Serialize};

use super::claim::{ClaimRecord, EventSummary};
use crate::error::{ClaimError, ClaimResult};

/// Layer name the backend uses for the low-fee settlement chain
pub const LOW_FEE_LAYER: &str = "Layer2";

/// Backend-issued authorization to mint one token on the canonical chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSignature {
    pub signature: String,
}

impl MigrationSignature {
    /// Decode the hex signature into the bytes passed to the contract
    pub fn to_bytes(&self) -> ClaimResult<Bytes> {
        if self.signature.trim().is_empty() {
            return Err(ClaimError::MalformedResponse("empty migration signature".into()));
        }
        Bytes::from_str(self.signature.trim()).map_err(|e| {
            ClaimError::MalformedResponse(format!("invalid migration signature: {}", e))
        })
    }
}

/// Token as exposed by the token lookup endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(rename = "tokenId")]
    pub token_id: String,

    pub owner: String,

    pub event: EventSummary,

    /// Layer the token currently lives on (`Layer1`, `Layer2`)
    #[serde(default)]
    pub layer: Option<String>,
}

impl TokenInfo {
    pub fn numeric_id(&self) -> ClaimResult<u64> {
        self.token_id
            .parse()
            .map_err(|_| ClaimError::MalformedResponse(format!("invalid token id: {}", self.token_id)))
    }

    /// Tokens without a layer are treated as low-fee layer tokens
    pub fn is_on_low_fee_layer(&self) -> bool {
        match self.layer.as_deref() {
            None => true,
            Some(layer) => layer == LOW_FEE_LAYER,
        }
    }
}

/// Arguments of the delegated `mintToken` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintTarget {
    pub event_id: u64,
    pub token_id: u64,
    pub beneficiary: Address,
}

impl MintTarget {
    pub fn new(event_id: u64, token_id: u64, beneficiary: Address) -> Self {
        Self {
            event_id,
            token_id,
            beneficiary,
        }
    }

    /// Build the target from a claim whose mint has passed
    pub fn from_claim(claim: &ClaimRecord) -> ClaimResult<Self> {
        let token_id = claim.minted_token().ok_or_else(|| {
            ClaimError::InvalidInput(format!(
                "claim {} has no minted token (status {})",
                claim.qr_hash, claim.tx_status
            ))
        })?;
        let beneficiary = claim.beneficiary.as_deref().ok_or_else(|| {
            ClaimError::MalformedResponse(format!("claim {} has no beneficiary", claim.qr_hash))
        })?;

        Ok(Self::new(claim.event_id, token_id, parse_address(beneficiary)?))
    }

    /// Build the target from a token lookup, minting to its current owner
    ///
    /// Only tokens on the low-fee layer can be migrated.
    pub fn from_token(token: &TokenInfo) -> ClaimResult<Self> {
        if !token.is_on_low_fee_layer() {
            return Err(ClaimError::InvalidInput(format!(
                "token {} is on {}, only {} tokens can be migrated",
                token.token_id,
                token.layer.as_deref().unwrap_or_default(),
                LOW_FEE_LAYER
            )));
        }
        Ok(Self::new(
            token.event.id,
            token.numeric_id()?,
            parse_address(&token.owner)?,
        ))
    }
}

/// Parse a hex address, mapping failures to a malformed response
pub fn parse_address(raw: &str) -> ClaimResult<Address> {
    Address::from_str(raw.trim())
        .map_err(|_| ClaimError::MalformedResponse(format!("invalid address: {}", raw)))
}
