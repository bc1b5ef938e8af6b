//! Wallet provider capability
//!
//! The orchestrator only needs a narrow slice of a wallet: connect, list accounts,
//! estimate and send a contract call, and look up receipts. `EthersWallet` backs
//! this with a JSON-RPC endpoint and a local signer; tests use the generated mock.

pub mod ethers_provider;
pub mod session;

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};

use crate::error::ClaimResult;
use crate::types::{MintTarget, TransactionReceipt};

pub use ethers_provider::EthersWallet;
pub use session::{WalletSession, WalletSessionManager};

/// Solidity signature of the delegated mint entry point
pub const MINT_TOKEN_SIGNATURE: &str = "mintToken(uint256,uint256,address,bytes)";

/// Wallet provider trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync + 'static {
    /// Connect to the wallet and return the chain id it is on
    ///
    /// # Errors
    /// * `ClaimError::UserRejected` if the user refuses the connection
    async fn connect(&self) -> ClaimResult<u64>;

    /// Accounts exposed by the connected wallet (empty when none is authorized)
    async fn get_accounts(&self) -> ClaimResult<Vec<Address>>;

    /// Estimate the gas a call will use
    async fn estimate_gas(&self, call: &ContractCall) -> ClaimResult<U256>;

    /// Sign and broadcast a call, returning its transaction hash
    ///
    /// # Errors
    /// * `ClaimError::UserRejected` if the user declines the signature
    /// * `ClaimError::ProviderError` for any other failure
    async fn send_transaction(&self, call: &ContractCall, gas_limit: U256) -> ClaimResult<H256>;

    /// Receipt of a transaction, `None` while it is not mined
    async fn get_transaction_receipt(&self, tx_hash: H256) -> ClaimResult<Option<TransactionReceipt>>;
}

/// A contract call ready to be estimated or sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub from: Address,
    pub data: Bytes,
}

impl ContractCall {
    /// `mintToken(eventId, tokenId, beneficiary, signature)` on the delegate contract
    pub fn mint_token(contract: Address, from: Address, target: &MintTarget, signature: Bytes) -> Self {
        let mut data = ethers::utils::id(MINT_TOKEN_SIGNATURE).to_vec();
        data.extend(abi::encode(&[
            Token::Uint(U256::from(target.event_id)),
            Token::Uint(U256::from(target.token_id)),
            Token::Address(target.beneficiary),
            Token::Bytes(signature.to_vec()),
        ]));

        Self {
            to: contract,
            from,
            data: Bytes::from(data),
        }
    }
}
