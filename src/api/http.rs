//! HTTP implementation of the claim service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use super::ClaimService;
use crate::config::ApiConfig;
use crate::error::{ClaimError, ClaimResult};
use crate::types::{ClaimRecord, EnsLookup, MigrationSignature, QueueMessage, QueueReceipt, TokenInfo};

/// Error body returned by the backend on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Claim service client talking to the REST backend
pub struct HttpClaimService {
    /// API root without trailing slash
    base_url: String,
    client: Client,
}

impl HttpClaimService {
    pub fn new(config: &ApiConfig) -> ClaimResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ClaimError::Config("api.base_url is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClaimError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode the JSON body
    async fn fetch_json<T: DeserializeOwned>(&self, what: &str, request: RequestBuilder) -> ClaimResult<T> {
        let response = request.send().await.map_err(|e| {
            warn!("Request for {} failed: {}", what, e);
            ClaimError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                error!("Failed to decode {} response: {}", what, e);
                ClaimError::MalformedResponse(format!("{}: {}", what, e))
            });
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(ErrorBody { message: Some(message) }) => message,
            _ => format!(
                "Request failed => statusCode: {} msg: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown")
            ),
        };
        debug!("Backend rejected {} with {}: {}", what, status, message);

        if status == StatusCode::NOT_FOUND {
            Err(ClaimError::NotFound(format!("{}: {}", what, message)))
        } else {
            Err(ClaimError::ServiceError(message))
        }
    }
}

#[async_trait]
impl ClaimService for HttpClaimService {
    async fn fetch_claim(&self, qr_hash: &str) -> ClaimResult<ClaimRecord> {
        let request = self
            .client
            .get(self.url("actions/claim-qr"))
            .query(&[("qr_hash", qr_hash)]);
        let claim: ClaimRecord = self.fetch_json(&format!("claim {}", qr_hash), request).await?;

        if claim.has_inconsistent_result() {
            warn!(
                "Claim {} carries a token while its status is {}",
                qr_hash, claim.tx_status
            );
        }
        Ok(claim)
    }

    async fn submit_claim(&self, qr_hash: &str, address: &str, secret: &str) -> ClaimResult<ClaimRecord> {
        let request = self.client.post(self.url("actions/claim-qr")).json(&json!({
            "qr_hash": qr_hash,
            "address": address,
            "secret": secret,
        }));
        self.fetch_json(&format!("claim submission {}", qr_hash), request).await
    }

    async fn request_migration_signature(&self, token_id: u64) -> ClaimResult<MigrationSignature> {
        let request = self
            .client
            .post(self.url("actions/migrate"))
            .json(&json!({ "tokenId": token_id }));
        self.fetch_json(&format!("migration of token {}", token_id), request)
            .await
            // A missing signature is a backend refusal, not a lookup miss
            .map_err(|e| match e {
                ClaimError::NotFound(message) => ClaimError::ServiceError(message),
                other => other,
            })
    }

    async fn fetch_token(&self, token_id: u64) -> ClaimResult<TokenInfo> {
        let request = self.client.get(self.url(&format!("token/{}", token_id)));
        self.fetch_json(&format!("token {}", token_id), request).await
    }

    async fn fetch_tokens_for(&self, account: &str) -> ClaimResult<Vec<TokenInfo>> {
        let request = self.client.get(self.url(&format!("actions/scan/{}", account)));
        self.fetch_json(&format!("tokens of {}", account), request).await
    }

    async fn resolve_ens(&self, name: &str) -> ClaimResult<EnsLookup> {
        let request = self
            .client
            .get(self.url("actions/ens_resolve"))
            .query(&[("name", name)]);
        self.fetch_json(&format!("ENS name {}", name), request).await
    }

    async fn lookup_ens(&self, address: &str) -> ClaimResult<EnsLookup> {
        let request = self.client.get(self.url(&format!("actions/ens_lookup/{}", address)));
        self.fetch_json(&format!("ENS lookup of {}", address), request).await
    }

    async fn redeem_with_email(&self, email: &str, address: &str, token: &str) -> ClaimResult<QueueReceipt> {
        let request = self.client.post(self.url("actions/redeem-email-tokens")).json(&json!({
            "email": email,
            "address": address,
            "token": token,
        }));
        self.fetch_json(&format!("email redemption for {}", email), request).await
    }

    async fn fetch_queue_message(&self, uid: &str) -> ClaimResult<QueueMessage> {
        let request = self.client.get(self.url(&format!("queue-message/{}", uid)));
        self.fetch_json(&format!("queue message {}", uid), request).await
    }
}
