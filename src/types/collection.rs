//! Collection types
//!
//! Badges held by one account, and the ENS lookups used to name that account.

use serde::{Deserialize, Serialize};

use super::migration::TokenInfo;

/// Answer of the ENS resolve and reverse lookup endpoints
///
/// For a forward lookup `ens` carries the address, for a reverse lookup the name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnsLookup {
    pub valid: bool,

    #[serde(default)]
    pub ens: Option<String>,
}

impl EnsLookup {
    pub fn found(value: impl Into<String>) -> Self {
        Self {
            valid: true,
            ens: Some(value.into()),
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    /// Resolved value, only when the lookup succeeded
    pub fn value(&self) -> Option<&str> {
        match (self.valid, self.ens.as_deref()) {
            (true, Some(value)) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }
}

/// A token together with its owner's ENS name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedToken {
    pub token: TokenInfo,
    pub owner_ens: Option<String>,
}

impl OwnedToken {
    /// `name.eth (0x..)` when the owner has an ENS name, the bare address otherwise
    pub fn owner_text(&self) -> String {
        match &self.owner_ens {
            Some(ens) => format!("{} ({})", ens, self.token.owner),
            None => self.token.owner.clone(),
        }
    }
}

/// Badges held by an address or email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// What the account is shown as (ENS name when known)
    pub display_name: String,
    /// Address or email the tokens were looked up for
    pub account: String,
    pub tokens: Vec<TokenInfo>,
}
