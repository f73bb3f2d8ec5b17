//! Domain entities and request/response types.
//!
//! Enum-to-Postgres mapping and derive shapes follow the teacher's
//! `models/mod.rs` conventions: `sqlx::Type` for stored enums, `FromRow` for
//! rows read back from the store, `validator::Validate` for inbound request
//! bodies.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// sqlx binds `numeric` columns as `BigDecimal`; business logic is easier to
/// write against `rust_decimal::Decimal`. Conversion is a string round trip,
/// which is exact for both types (both are base-10 arbitrary precision).
pub fn bd_to_dec(v: &BigDecimal) -> Decimal {
    Decimal::from_str(&v.to_string()).expect("BigDecimal always parses back into Decimal")
}

pub fn dec_to_bd(v: Decimal) -> BigDecimal {
    BigDecimal::from_str(&v.to_string()).expect("Decimal always parses back into BigDecimal")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionType {
    Grant,
    Ads,
}

impl PromotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionType::Grant => "grant",
            PromotionType::Ads => "ads",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Promotion {
    pub id: Uuid,
    pub promotion_type: String,
    pub approximate_value: BigDecimal,
    pub suggestions_per_grant: BigDecimal,
    pub remaining_grants: i32,
    pub platform: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub claimable_until: Option<DateTime<Utc>>,
}

impl Promotion {
    pub fn approximate_value(&self) -> Decimal {
        bd_to_dec(&self.approximate_value)
    }

    pub fn suggestions_per_grant(&self) -> Decimal {
        bd_to_dec(&self.suggestions_per_grant)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Issuer {
    pub promotion_id: Uuid,
    pub cohort: String,
    pub public_key: String,
    pub external_name: String,
    pub created_at: DateTime<Utc>,
}

impl Issuer {
    pub fn external_name_for(promotion_id: Uuid, cohort: &str) -> String {
        format!("{}:{}", promotion_id, cohort)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Claim {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub wallet_id: Uuid,
    pub approximate_value: BigDecimal,
    pub bonus: BigDecimal,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub legacy_claimed: bool,
    pub drained: bool,
    pub drained_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn approximate_value(&self) -> Decimal {
        bd_to_dec(&self.approximate_value)
    }

    pub fn bonus(&self) -> Decimal {
        bd_to_dec(&self.bonus)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClaimCredentials {
    pub claim_id: Uuid,
    pub cohort: String,
    pub blinded_tokens: serde_json::Value,
    pub signed_tokens: Option<serde_json::Value>,
    pub batch_proof: Option<String>,
    pub public_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SuggestionJob {
    pub id: Uuid,
    pub credentials_binding: serde_json::Value,
    pub suggestion_text: String,
    pub suggestion_event: serde_json::Value,
    pub erred: bool,
    pub err_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DrainJob {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub claim_id: Option<Uuid>,
    pub credentials_binding: serde_json::Value,
    pub total: BigDecimal,
    pub batch_id: Uuid,
    pub deposit_provider: String,
    pub deposit_destination: String,
    pub transaction_id: Option<String>,
    pub erred: bool,
    pub err_code: Option<String>,
    pub status: Option<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DrainJob {
    pub fn total(&self) -> Decimal {
        bd_to_dec(&self.total)
    }
}

pub mod drain_status {
    pub const INITIALIZED: &str = "initialized";
    pub const PREPARED: &str = "prepared";
    pub const SUBMITTED: &str = "submitted";
    pub const GEMINI_PENDING: &str = "gemini-pending";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
    pub const REPUTATION_FAILED: &str = "reputation-failed";
    pub const EXCEEDED_WITHDRAWAL_LIMIT: &str = "exceeded-withdrawal-limit";
    pub const MANUAL_RETRY: &str = "manual-retry";
    pub const RETRY_BYPASS_CBR: &str = "retry-bypass-cbr";
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MintJob {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub done: bool,
    pub erred: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MintJobPromotion {
    pub mint_drain_id: Uuid,
    pub wallet_id: Uuid,
    pub promotion_id: Uuid,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClobberedClaim {
    pub id: Uuid,
    pub version: i32,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LossEvent {
    pub wallet_id: Uuid,
    pub report_id: String,
    pub amount: BigDecimal,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BapReportEvent {
    pub wallet_id: Uuid,
    pub report_id: Uuid,
    pub amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

// --- Request / response wire types -----------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct ClaimPromotionRequest {
    #[validate(length(min = 1, message = "at least one blinded token is required"))]
    pub blinded_creds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimPromotionResponse {
    pub claim_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ClaimCredentialsResponse {
    pub signed_creds: serde_json::Value,
    pub batch_proof: String,
    pub public_key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePromotionRequest {
    pub promotion_type: PromotionType,
    #[validate(range(min = 1, message = "numGrants must be positive"))]
    pub num_grants: i32,
    pub value: Decimal,
    #[serde(default = "default_suggestions_per_grant")]
    pub suggestions_per_grant: Decimal,
    #[validate(length(min = 1))]
    pub platform: String,
}

fn default_suggestions_per_grant() -> Decimal {
    Decimal::new(40, 0)
}

#[derive(Debug, Serialize)]
pub struct ClaimSummaryResponse {
    #[serde(rename = "type")]
    pub promotion_type: String,
    pub amount: Decimal,
    pub earnings: Decimal,
    pub last_claim: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SuggestRequest {
    #[validate(length(min = 1))]
    pub credentials: Vec<CredentialBinding>,
    #[validate(length(min = 1))]
    pub suggestion_text: String,
    pub suggestion_event: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialBinding {
    pub issuer: String,
    pub token_preimage: String,
    pub signature: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DrainRequest {
    #[validate(length(min = 1))]
    pub credentials: Vec<CredentialBinding>,
}

#[derive(Debug, Serialize)]
pub struct DrainResponse {
    pub batch_id: Uuid,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrainPollStatus {
    Complete,
    Delayed,
    Pending,
    InProgress,
    Unknown,
}

#[derive(Debug, Serialize)]
pub struct DrainPollResponse {
    pub status: DrainPollStatus,
}

#[derive(Debug, Serialize)]
pub struct CustodianDrainSummary {
    pub batch_id: Uuid,
    pub custodian: String,
    pub promotions_drained: Vec<Uuid>,
    pub total_value: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportClobberedClaimsRequest {
    #[validate(length(min = 1))]
    pub claim_ids: Vec<Uuid>,
    pub version: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportBatLossRequest {
    pub report_id: String,
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub platform: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportBapEventRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ReportBapEventResponse {
    pub report_bap_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PatchDrainJobErredRequest {
    pub erred: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_bigdecimal_round_trip_is_exact() {
        let d = Decimal::new(512, 2); // 5.12
        let bd = dec_to_bd(d);
        assert_eq!(bd_to_dec(&bd), d);
    }

    #[test]
    fn promotion_type_as_str_matches_stored_text() {
        assert_eq!(PromotionType::Grant.as_str(), "grant");
        assert_eq!(PromotionType::Ads.as_str(), "ads");
    }
}
