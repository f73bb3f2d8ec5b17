//! Promotion and claim endpoints.

use crate::errors::CoreError;
use crate::models::{
    ClaimCredentialsResponse, ClaimPromotionRequest, ClaimPromotionResponse,
    ClaimSummaryResponse, CreatePromotionRequest, Promotion,
};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub async fn claim_promotion(
    State(state): State<Arc<AppState>>,
    Path((promotion_id, wallet_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ClaimPromotionRequest>,
) -> Result<Json<ClaimPromotionResponse>, CoreError> {
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;
    let claim_id = state
        .claim_engine
        .claim_promotion(promotion_id, wallet_id, req.blinded_creds)
        .await?;
    state.metrics.increment(crate::observability::metrics::CLAIM_CREATED, 1).await;
    Ok(Json(ClaimPromotionResponse { claim_id }))
}

pub async fn get_claim(
    State(state): State<Arc<AppState>>,
    Path(claim_id): Path<Uuid>,
) -> Result<Json<ClaimCredentialsResponse>, CoreError> {
    let (_, creds) = state.claim_engine.get_claim(claim_id).await?.ok_or(CoreError::NotFound)?;
    let signed = creds.signed_tokens.ok_or(CoreError::NotReady)?;
    Ok(Json(ClaimCredentialsResponse {
        signed_creds: signed,
        batch_proof: creds.batch_proof.unwrap_or_default(),
        public_key: creds.public_key.unwrap_or_default(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AvailablePromotionsQuery {
    pub platform: String,
    pub wallet_id: Option<Uuid>,
}

pub async fn get_available_promotions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AvailablePromotionsQuery>,
) -> Result<Json<Vec<Promotion>>, CoreError> {
    let promotions = sqlx::query_as::<_, Promotion>(
        "SELECT * FROM promotions WHERE active AND platform = $1 AND remaining_grants > 0
         ORDER BY created_at DESC",
    )
    .bind(&q.platform)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(promotions))
}

pub async fn create_promotion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePromotionRequest>,
) -> Result<Json<Promotion>, CoreError> {
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;

    let promotion = sqlx::query_as::<_, Promotion>(
        "INSERT INTO promotions (promotion_type, approximate_value, suggestions_per_grant, remaining_grants, platform)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(req.promotion_type.as_str())
    .bind(crate::models::dec_to_bd(req.value))
    .bind(crate::models::dec_to_bd(req.suggestions_per_grant))
    .bind(req.num_grants)
    .bind(&req.platform)
    .fetch_one(&state.db)
    .await?;

    state
        .issuer_registry
        .get_or_create_issuer(promotion.id, "control")
        .await
        .map_err(CoreError::Internal)?;

    Ok(Json(promotion))
}

#[derive(Debug, Deserialize)]
pub struct ClaimSummaryQuery {
    #[serde(rename = "type")]
    pub promotion_type: String,
}

pub async fn get_claim_summary(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<Uuid>,
    Query(q): Query<ClaimSummaryQuery>,
) -> Result<Json<Option<ClaimSummaryResponse>>, CoreError> {
    let excluded: Vec<Uuid> = state.config.transfer_promotion_ids.iter().copied().collect();
    let summary = state
        .poll_query
        .get_claim_summary(wallet_id, &q.promotion_type, &excluded)
        .await
        .map_err(CoreError::Internal)?;

    Ok(Json(summary.map(|(amount, last_claim)| ClaimSummaryResponse {
        promotion_type: q.promotion_type,
        amount,
        earnings: amount,
        last_claim,
    })))
}
