//! External collaborator interfaces.
//!
//! These are the seams the core depends on but does not implement: the
//! anonymous-credential issuer, per-provider custodian transfer APIs, wallet
//! lookup, reputation checks, and durable event publication. Each is a plain
//! async trait (object-safe, no `async_trait` macro needed since Rust 1.75),
//! held behind `Arc<dyn Trait>` on `AppState`, mirroring how the teacher holds
//! `WebhookNotifier`/`AlertManager` as cloneable handles.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

pub mod http;

#[derive(Debug, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub public_key: String,
    pub deposit_provider: String,
    pub deposit_destination: String,
    pub linking_id: Option<Uuid>,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn get_wallet(&self, wallet_id: Uuid) -> anyhow::Result<Option<Wallet>>;
}

#[derive(Debug, Clone)]
pub struct SignedCredentials {
    pub signed: serde_json::Value,
    pub batch_proof: String,
    pub public_key: String,
}

#[async_trait]
pub trait IssuerClient: Send + Sync {
    async fn create_issuer(&self, name: &str, max_tokens: u32) -> anyhow::Result<()>;
    async fn get_issuer_public_key(&self, name: &str) -> anyhow::Result<Option<String>>;
    async fn sign_credentials(
        &self,
        issuer_name: &str,
        blinded_tokens: &serde_json::Value,
    ) -> anyhow::Result<SignedCredentials>;
    async fn redeem_credentials(
        &self,
        credentials: &[crate::models::CredentialBinding],
    ) -> anyhow::Result<()>;
    async fn mint_grant(
        &self,
        destination: &str,
        total: Decimal,
        promotion_ids: &[Uuid],
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Complete,
    PreparedForBatch,
    Pending,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub tx_id: String,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Complete,
    Pending,
    Failed(String),
}

/// A classified transfer failure. `code` is the stable classification key
/// used by `drain::classify`; `retriable` marks whether `DrainExecutor`
/// should leave the job eligible for another attempt.
#[derive(Debug, thiserror::Error)]
#[error("custodian transfer failed: {code}")]
pub struct CustodianError {
    pub code: String,
    pub retriable: bool,
}

#[async_trait]
pub trait CustodianClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn redeem_and_transfer(
        &self,
        credentials: &serde_json::Value,
        destination: &str,
        amount: Decimal,
    ) -> Result<TransferResult, CustodianError>;

    async fn submit_batch_transfer(&self, batch_id: Uuid) -> Result<(), CustodianError>;

    async fn tx_status(&self, tx_id: &str) -> Result<TxStatus, CustodianError>;
}

#[async_trait]
pub trait ReputationClient: Send + Sync {
    async fn is_wallet_reputable(&self, wallet_id: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> anyhow::Result<()>;
}
