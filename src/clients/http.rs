//! `reqwest`-based implementations of the external collaborator traits,
//! shaped after `control-plane/src/webhook.rs::WebhookNotifier`: a thin
//! wrapper around a shared `reqwest::Client` with a base URL and a bearer
//! token, one method per upstream call, errors logged and turned into the
//! trait's result type rather than panicking.

use super::{
    CustodianClient, CustodianError, IssuerClient, Publisher, ReputationClient, SignedCredentials,
    TransferOutcome, TransferResult, TxStatus, Wallet, WalletService,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
            timeout: Duration::from_secs(15),
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client config is always valid")
}

pub struct HttpIssuerClient {
    client: reqwest::Client,
    cfg: HttpClientConfig,
}

impl HttpIssuerClient {
    pub fn new(cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
        }
    }
}

#[async_trait]
impl IssuerClient for HttpIssuerClient {
    async fn create_issuer(&self, name: &str, max_tokens: u32) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/v1/issuers", self.cfg.base_url))
            .bearer_auth(&self.cfg.bearer_token)
            .json(&serde_json::json!({ "name": name, "max_tokens": max_tokens }))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("create_issuer failed: {}", resp.status());
        }
        Ok(())
    }

    async fn get_issuer_public_key(&self, name: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/v1/issuers/{}", self.cfg.base_url, name))
            .bearer_auth(&self.cfg.bearer_token)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: serde_json::Value = resp.error_for_status()?.json().await?;
        Ok(body.get("public_key").and_then(|v| v.as_str()).map(str::to_string))
    }

    async fn sign_credentials(
        &self,
        issuer_name: &str,
        blinded_tokens: &serde_json::Value,
    ) -> anyhow::Result<SignedCredentials> {
        let resp = self
            .client
            .post(format!("{}/v1/issuers/{}/sign", self.cfg.base_url, issuer_name))
            .bearer_auth(&self.cfg.bearer_token)
            .json(&serde_json::json!({ "blinded_tokens": blinded_tokens }))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        Ok(SignedCredentials {
            signed: body["signed_tokens"].clone(),
            batch_proof: body["batch_proof"].as_str().unwrap_or_default().to_string(),
            public_key: body["public_key"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn redeem_credentials(
        &self,
        credentials: &[crate::models::CredentialBinding],
    ) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/v1/credentials/redeem", self.cfg.base_url))
            .bearer_auth(&self.cfg.bearer_token)
            .json(&serde_json::json!({ "credentials": credentials }))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("redeem_credentials failed: {}", resp.status());
        }
        Ok(())
    }

    async fn mint_grant(
        &self,
        destination: &str,
        total: Decimal,
        promotion_ids: &[Uuid],
    ) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/v1/grants/mint", self.cfg.base_url))
            .bearer_auth(&self.cfg.bearer_token)
            .json(&serde_json::json!({
                "destination": destination,
                "total": total.to_string(),
                "promotion_ids": promotion_ids,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("mint_grant failed: {}", resp.status());
        }
        Ok(())
    }
}

/// One instance per provider (A, B, C); `provider_name` and the response
/// mapping are the only things that differ, matching how
/// `claim_drain.deposit_provider` selects which transfer semantics apply
/// (see SPEC_FULL.md §4.5.2).
pub struct HttpCustodianClient {
    client: reqwest::Client,
    cfg: HttpClientConfig,
    provider_name: &'static str,
    batches: bool,
    polled: bool,
}

impl HttpCustodianClient {
    pub fn synchronous(name: &'static str, cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
            provider_name: name,
            batches: false,
            polled: false,
        }
    }

    pub fn batched(name: &'static str, cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
            provider_name: name,
            batches: true,
            polled: false,
        }
    }

    pub fn polled(name: &'static str, cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
            provider_name: name,
            batches: false,
            polled: true,
        }
    }
}

fn classify_reqwest_err(e: reqwest::Error) -> CustodianError {
    if e.is_timeout() || e.is_connect() {
        CustodianError {
            code: "failed_client".to_string(),
            retriable: true,
        }
    } else {
        CustodianError {
            code: "failed_response_body".to_string(),
            retriable: true,
        }
    }
}

#[async_trait]
impl CustodianClient for HttpCustodianClient {
    fn provider_name(&self) -> &'static str {
        self.provider_name
    }

    async fn redeem_and_transfer(
        &self,
        credentials: &serde_json::Value,
        destination: &str,
        amount: Decimal,
    ) -> Result<TransferResult, CustodianError> {
        let resp = self
            .client
            .post(format!("{}/transfers", self.cfg.base_url))
            .bearer_auth(&self.cfg.bearer_token)
            .json(&serde_json::json!({
                "credentials": credentials,
                "destination": destination,
                "amount": amount.to_string(),
            }))
            .send()
            .await
            .map_err(classify_reqwest_err)?;

        if !resp.status().is_success() {
            return Err(CustodianError {
                code: "create_transfer".to_string(),
                retriable: resp.status().is_server_error(),
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|_| CustodianError {
                code: "failed_response_unmarshal".to_string(),
                retriable: true,
            })?;

        let tx_id = body["tx_id"].as_str().unwrap_or_default().to_string();
        let outcome = if self.batches {
            TransferOutcome::PreparedForBatch
        } else if self.polled {
            TransferOutcome::Pending
        } else {
            TransferOutcome::Complete
        };
        Ok(TransferResult { tx_id, outcome })
    }

    async fn submit_batch_transfer(&self, batch_id: Uuid) -> Result<(), CustodianError> {
        let resp = self
            .client
            .post(format!("{}/batches/{}/submit", self.cfg.base_url, batch_id))
            .bearer_auth(&self.cfg.bearer_token)
            .send()
            .await
            .map_err(classify_reqwest_err)?;
        if !resp.status().is_success() {
            return Err(CustodianError {
                code: "create_transfer".to_string(),
                retriable: resp.status().is_server_error(),
            });
        }
        Ok(())
    }

    async fn tx_status(&self, tx_id: &str) -> Result<TxStatus, CustodianError> {
        let resp = self
            .client
            .get(format!("{}/transfers/{}", self.cfg.base_url, tx_id))
            .bearer_auth(&self.cfg.bearer_token)
            .send()
            .await
            .map_err(classify_reqwest_err)?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|_| CustodianError {
                code: "failed_response_unmarshal".to_string(),
                retriable: true,
            })?;
        match body["status"].as_str() {
            Some("complete") => Ok(TxStatus::Complete),
            Some("pending") => Ok(TxStatus::Pending),
            Some(other) => Ok(TxStatus::Failed(other.to_string())),
            None => Ok(TxStatus::Failed("unknown".to_string())),
        }
    }
}

pub struct HttpWalletService {
    client: reqwest::Client,
    cfg: HttpClientConfig,
}

impl HttpWalletService {
    pub fn new(cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
        }
    }
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn get_wallet(&self, wallet_id: Uuid) -> anyhow::Result<Option<Wallet>> {
        let resp = self
            .client
            .get(format!("{}/v1/wallets/{}", self.cfg.base_url, wallet_id))
            .bearer_auth(&self.cfg.bearer_token)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: serde_json::Value = resp.error_for_status()?.json().await?;
        Ok(Some(Wallet {
            id: wallet_id,
            public_key: body["public_key"].as_str().unwrap_or_default().to_string(),
            deposit_provider: body["deposit_provider"].as_str().unwrap_or_default().to_string(),
            deposit_destination: body["deposit_destination"].as_str().unwrap_or_default().to_string(),
            linking_id: body["linking_id"].as_str().and_then(|s| Uuid::parse_str(s).ok()),
        }))
    }
}

pub struct HttpReputationClient {
    client: reqwest::Client,
    cfg: HttpClientConfig,
}

impl HttpReputationClient {
    pub fn new(cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
        }
    }
}

#[async_trait]
impl ReputationClient for HttpReputationClient {
    async fn is_wallet_reputable(&self, wallet_id: Uuid) -> anyhow::Result<bool> {
        let resp = self
            .client
            .get(format!("{}/v1/wallets/{}/reputation", self.cfg.base_url, wallet_id))
            .bearer_auth(&self.cfg.bearer_token)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        Ok(body.get("reputable").and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

/// Publishes drain/suggestion events to the upstream event collector. One
/// `POST` per publish, matching `WebhookNotifier`'s fire-and-forget shape.
pub struct HttpPublisher {
    client: reqwest::Client,
    cfg: HttpClientConfig,
}

impl HttpPublisher {
    pub fn new(cfg: HttpClientConfig) -> Self {
        Self {
            client: build_client(cfg.timeout),
            cfg,
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/v1/events/{}", self.cfg.base_url, topic))
            .bearer_auth(&self.cfg.bearer_token)
            .json(payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("publish to {} failed: {}", topic, resp.status());
        }
        Ok(())
    }
}
