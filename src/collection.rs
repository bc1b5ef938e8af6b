//! Collection browsing
//!
//! Lists the badges held by an address, ENS name or email, and names token owners
//! by their ENS name when they have one.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::ClaimService;
use crate::claim::Beneficiary;
use crate::error::{ClaimError, ClaimResult};
use crate::types::{Collection, OwnedToken};

/// Read-only view over the badges held by an account
#[derive(Clone)]
pub struct CollectionBrowser {
    service: Arc<dyn ClaimService>,
}

impl CollectionBrowser {
    pub fn new(service: Arc<dyn ClaimService>) -> Self {
        Self { service }
    }

    /// Turn user input into `(display name, account)`
    ///
    /// Addresses are named by their reverse ENS record when one exists; a failed
    /// reverse lookup keeps the bare address. ENS names must resolve.
    pub async fn resolve_account(&self, input: &str) -> ClaimResult<(String, String)> {
        match Beneficiary::parse(input)? {
            Beneficiary::Address(address) => {
                let account = format!("{:?}", address);
                match self.service.lookup_ens(&account).await {
                    Ok(lookup) => {
                        let name = lookup.value().unwrap_or(account.as_str()).to_string();
                        Ok((name, account))
                    }
                    Err(e) => {
                        debug!("Reverse ENS lookup of {} failed: {}", account, e);
                        Ok((account.clone(), account))
                    }
                }
            }
            Beneficiary::Email(email) => Ok((email.clone(), email)),
            Beneficiary::Ens(name) => {
                let lookup = self.service.resolve_ens(&name).await?;
                match lookup.value() {
                    Some(address) => Ok((name, address.to_string())),
                    None => Err(ClaimError::InvalidInput(format!(
                        "{} does not resolve to an address",
                        name
                    ))),
                }
            }
        }
    }

    /// Badges held by an address, ENS name or email
    pub async fn scan(&self, input: &str) -> ClaimResult<Collection> {
        let (display_name, account) = self.resolve_account(input).await?;
        let tokens = self.service.fetch_tokens_for(&account).await?;
        info!("{} holds {} badge(s)", display_name, tokens.len());

        Ok(Collection {
            display_name,
            account,
            tokens,
        })
    }

    /// Look up a token and its owner's ENS name
    ///
    /// The token is still returned when the ENS lookup fails.
    pub async fn token(&self, token_id: u64) -> ClaimResult<OwnedToken> {
        let token = self.service.fetch_token(token_id).await?;
        let owner_ens = match self.service.lookup_ens(&token.owner).await {
            Ok(lookup) => lookup.value().map(str::to_string),
            Err(e) => {
                debug!("ENS lookup for owner of token {} failed: {}", token_id, e);
                None
            }
        };

        Ok(OwnedToken { token, owner_ens })
    }
}
