//! Core error taxonomy, mapped to wire responses by the Transport layer.
//!
//! Generalizes the teacher's ad hoc `(StatusCode, String)` handler returns
//! into one typed enum, since many call sites here need to map the same
//! variant to the same status (see SPEC_FULL.md §6).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("claimed with different blinded credentials")]
    ClaimedDifferentBlindCreds,

    #[error("conflicting loss event amount")]
    ConflictLossEvent,

    #[error("conflicting BAP report amount")]
    ConflictBapReportEvent,

    #[error("no matching active promotion")]
    NoMatchingActivePromotion,

    #[error("credentials not yet signed")]
    NotReady,

    #[error("wallet is not reputable")]
    WalletNotReputable,

    #[error("reputation service failure")]
    ReputationServiceFailure,

    #[error("exceeded withdrawal limit")]
    ExceededWithdrawalLimit,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Internal(anyhow::anyhow!(e))
    }
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::ClaimedDifferentBlindCreds
            | CoreError::ConflictLossEvent
            | CoreError::ConflictBapReportEvent => StatusCode::CONFLICT,
            CoreError::NoMatchingActivePromotion => StatusCode::GONE,
            CoreError::NotReady => StatusCode::ACCEPTED,
            CoreError::WalletNotReputable => StatusCode::FORBIDDEN,
            CoreError::ReputationServiceFailure => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::ExceededWithdrawalLimit => StatusCode::FORBIDDEN,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        if matches!(self, CoreError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
