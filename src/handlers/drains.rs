//! Drain and reporting endpoints.

use crate::errors::CoreError;
use crate::models::{
    bd_to_dec, dec_to_bd, BapReportEvent, CustodianDrainSummary, DrainPollResponse,
    DrainRequest, DrainResponse, PatchDrainJobErredRequest, ReportBapEventRequest,
    ReportBapEventResponse, ReportBatLossRequest, ReportClobberedClaimsRequest,
};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub async fn drain(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<Uuid>,
    Json(req): Json<DrainRequest>,
) -> Result<Json<DrainResponse>, CoreError> {
    if !state.config.enable_linking_draining {
        return Err(CoreError::Validation("draining is disabled".to_string()));
    }
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;
    let batch_id = state.drain_ingest.drain(wallet_id, req.credentials).await?;
    state.metrics.increment(crate::observability::metrics::DRAIN_INGESTED, 1).await;
    Ok(Json(DrainResponse { batch_id }))
}

pub async fn get_drain_poll(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<DrainPollResponse>, CoreError> {
    let poll = state.poll_query.get_drain_poll(batch_id).await.map_err(CoreError::Internal)?;
    Ok(Json(poll))
}

pub async fn get_custodian_drain_info(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<Uuid>,
) -> Result<Json<Vec<CustodianDrainSummary>>, CoreError> {
    let info = state
        .poll_query
        .get_custodian_drain_info(wallet_id)
        .await
        .map_err(CoreError::Internal)?;
    Ok(Json(info))
}

pub async fn patch_drain_job_erred(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<Uuid>,
    Json(req): Json<PatchDrainJobErredRequest>,
) -> Result<StatusCode, CoreError> {
    // Open Question (SPEC_FULL.md §9): preserved as specified — only
    // `erred=false` (clearing the flag) is accepted.
    if req.erred {
        return Err(CoreError::Validation("erred must be false".to_string()));
    }
    state.retry_arbiter.manual_retry(wallet_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn report_clobbered_claims(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReportClobberedClaimsRequest>,
) -> Result<StatusCode, CoreError> {
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;
    for claim_id in req.claim_ids {
        sqlx::query(
            "INSERT INTO clobbered_claims (id, version) VALUES ($1, $2)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(claim_id)
        .bind(req.version)
        .execute(&state.db)
        .await?;
    }
    Ok(StatusCode::OK)
}

pub async fn report_bat_loss(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<Uuid>,
    Json(req): Json<ReportBatLossRequest>,
) -> Result<StatusCode, CoreError> {
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;

    let existing: Option<(bigdecimal::BigDecimal,)> = sqlx::query_as(
        "SELECT amount FROM bat_loss_events WHERE wallet_id = $1 AND report_id = $2",
    )
    .bind(wallet_id)
    .bind(&req.report_id)
    .fetch_optional(&state.db)
    .await?;

    if let Some((amount,)) = existing {
        return if bd_to_dec(&amount) == req.amount {
            Ok(StatusCode::OK)
        } else {
            Err(CoreError::ConflictLossEvent)
        };
    }

    sqlx::query(
        "INSERT INTO bat_loss_events (wallet_id, report_id, amount, platform) VALUES ($1, $2, $3, $4)",
    )
    .bind(wallet_id)
    .bind(&req.report_id)
    .bind(dec_to_bd(req.amount))
    .bind(&req.platform)
    .execute(&state.db)
    .await?;

    Ok(StatusCode::CREATED)
}

pub async fn report_bap_event(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<Uuid>,
    Json(req): Json<ReportBapEventRequest>,
) -> Result<Json<ReportBapEventResponse>, CoreError> {
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;

    let existing = sqlx::query_as::<_, BapReportEvent>(
        "SELECT * FROM bap_report WHERE wallet_id = $1",
    )
    .bind(wallet_id)
    .fetch_optional(&state.db)
    .await?;

    if let Some(existing) = existing {
        return if bd_to_dec(&existing.amount) == req.amount {
            Ok(Json(ReportBapEventResponse {
                report_bap_id: existing.report_id,
            }))
        } else {
            Err(CoreError::ConflictBapReportEvent)
        };
    }

    let created = sqlx::query_as::<_, BapReportEvent>(
        "INSERT INTO bap_report (wallet_id, amount) VALUES ($1, $2) RETURNING *",
    )
    .bind(wallet_id)
    .bind(dec_to_bd(req.amount))
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ReportBapEventResponse {
        report_bap_id: created.report_id,
    }))
}
