//! `RetryArbiter`: consumes wallet re-attestations (reputation refreshed)
//! and flips matching `reputation-failed` jobs back into a retryable state;
//! also serves manual retry requests from an operator.
//!
//! The cancellable select-loop shape is grounded in
//! `bot-runner/src/runner.rs::BotRunner::run`'s `tokio::select!` across
//! several timers; here the arms are "new attestation" vs "cancel".

use crate::db::Db;
use crate::errors::CoreError;
use crate::models::drain_status;
use crate::observability::{metrics, MetricsCollector};
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct RetryArbiter {
    db: Db,
    metrics: MetricsCollector,
}

impl RetryArbiter {
    pub fn new(db: Db, metrics: MetricsCollector) -> Self {
        Self { db, metrics }
    }

    /// Flips all `reputation-failed` jobs for a wallet to `retry-bypass-cbr`,
    /// signalling `DrainExecutor` to skip re-redemption (the credentials were
    /// already redeemed against the issuer).
    pub async fn retry_after_reputation(&self, wallet_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE claim_drain SET erred = false, status = $1, updated_at = now()
             WHERE wallet_id = $2 AND erred AND err_code = 'reputation-failed' AND status = $3",
        )
        .bind(drain_status::RETRY_BYPASS_CBR)
        .bind(wallet_id)
        .bind(drain_status::REPUTATION_FAILED)
        .execute(&self.db)
        .await?;
        if result.rows_affected() > 0 {
            self.metrics.increment(metrics::DRAIN_RETRIED, result.rows_affected()).await;
        }
        Ok(result.rows_affected())
    }

    /// `ManualRetry`: operator-triggered retry for failed/reputation-failed
    /// jobs that never reached the custodian (no transaction id yet).
    pub async fn manual_retry(&self, wallet_id: Uuid) -> Result<u64, CoreError> {
        let result = sqlx::query(
            "UPDATE claim_drain SET erred = false, status = $1, updated_at = now()
             WHERE wallet_id = $2 AND erred AND status IN ($3, $4) AND transaction_id IS NULL",
        )
        .bind(drain_status::MANUAL_RETRY)
        .bind(wallet_id)
        .bind(drain_status::REPUTATION_FAILED)
        .bind(drain_status::FAILED)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        self.metrics.increment(metrics::DRAIN_RETRIED, result.rows_affected()).await;
        Ok(result.rows_affected())
    }

    /// Long-running loop consuming wallet attestation signals, cancellable
    /// via the paired sender being dropped.
    pub async fn run(self, mut attestations: mpsc::Receiver<Uuid>) {
        loop {
            tokio::select! {
                wallet_id = attestations.recv() => {
                    match wallet_id {
                        Some(wallet_id) => {
                            if let Err(e) = self.retry_after_reputation(wallet_id).await {
                                tracing::error!(wallet_id = %wallet_id, error = %e, "retry arbiter failed to process attestation");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }
}
