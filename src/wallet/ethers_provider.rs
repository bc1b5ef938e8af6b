//! `ethers` implementation of the wallet provider
//!
//! A JSON-RPC provider plus a local signer read from the environment variable
//! named by `chain.signer_key_env`. Without a key the wallet refuses to connect.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, H256, U256};
use tracing::{debug, error, info};

use super::{ContractCall, WalletProvider};
use crate::config::ChainConfig;
use crate::error::{ClaimError, ClaimResult};
use crate::types::TransactionReceipt;

pub struct EthersWallet {
    provider: Provider<Http>,
    signer: Option<LocalWallet>,
    signer_key_env: String,
}

impl EthersWallet {
    /// Build the wallet from chain settings, reading the signer key from the environment
    pub fn from_config(chain: &ChainConfig) -> ClaimResult<Self> {
        let key = std::env::var(&chain.signer_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::new(chain, key.as_deref())
    }

    pub fn new(chain: &ChainConfig, signer_key: Option<&str>) -> ClaimResult<Self> {
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
            .map_err(|e| ClaimError::Config(format!("invalid RPC url {}: {}", chain.rpc_url, e)))?;

        let signer = match signer_key {
            Some(key) => Some(
                key.trim()
                    .trim_start_matches("0x")
                    .parse::<LocalWallet>()
                    .map_err(|e| ClaimError::Config(format!("invalid signer key: {}", e)))?
                    .with_chain_id(chain.chain_id),
            ),
            None => None,
        };

        Ok(Self {
            provider,
            signer,
            signer_key_env: chain.signer_key_env.clone(),
        })
    }

    fn signer(&self) -> ClaimResult<&LocalWallet> {
        self.signer.as_ref().ok_or_else(|| {
            ClaimError::UserRejected(format!("no signer key set in {}", self.signer_key_env))
        })
    }

    fn request(call: &ContractCall) -> TransactionRequest {
        TransactionRequest::new()
            .to(call.to)
            .from(call.from)
            .data(call.data.clone())
    }
}

#[async_trait]
impl WalletProvider for EthersWallet {
    async fn connect(&self) -> ClaimResult<u64> {
        let signer = self.signer()?;
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ClaimError::ProviderError(e.to_string()))?;

        info!("Connected {:?} to chain {}", signer.address(), chain_id);
        Ok(chain_id.as_u64())
    }

    async fn get_accounts(&self) -> ClaimResult<Vec<Address>> {
        Ok(self.signer.iter().map(|s| s.address()).collect())
    }

    async fn estimate_gas(&self, call: &ContractCall) -> ClaimResult<U256> {
        let tx: TypedTransaction = Self::request(call).into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| ClaimError::from_provider_message(e.to_string()))
    }

    async fn send_transaction(&self, call: &ContractCall, gas_limit: U256) -> ClaimResult<H256> {
        let signer = self.signer()?.clone();
        let client = SignerMiddleware::new(self.provider.clone(), signer);
        let tx = Self::request(call).gas(gas_limit);

        let pending = client.send_transaction(tx, None).await.map_err(|e| {
            error!("Failed to send transaction to {:?}: {}", call.to, e);
            ClaimError::from_provider_message(e.to_string())
        })?;

        let tx_hash = pending.tx_hash();
        debug!("Transaction {:?} sent with gas limit {}", tx_hash, gas_limit);
        Ok(tx_hash)
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> ClaimResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map(|receipt| receipt.map(TransactionReceipt::from))
            .map_err(|e| ClaimError::ProviderError(e.to_string()))
    }
}
