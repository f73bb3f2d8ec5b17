//! Suggestion submission endpoint.

use crate::errors::CoreError;
use crate::models::SuggestRequest;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use validator::Validate;

pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SuggestRequest>,
) -> Result<StatusCode, CoreError> {
    req.validate().map_err(|e| CoreError::Validation(e.to_string()))?;
    state
        .suggestion_pipeline
        .submit(req.credentials, req.suggestion_text, req.suggestion_event)
        .await
        .map_err(CoreError::Internal)?;
    Ok(StatusCode::CREATED)
}
