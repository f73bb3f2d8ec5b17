//! `PollChecker` (provider C): polls one stale `gemini-pending` job at a
//! time, oldest first, so no single job starves behind a noisy one.

use crate::clients::{CustodianClient, TxStatus};
use crate::db::Db;
use crate::models::drain_status;
use crate::observability::{metrics, MetricsCollector};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct PollChecker {
    db: Db,
    custodian: Arc<dyn CustodianClient>,
    staleness: Duration,
    metrics: MetricsCollector,
}

impl PollChecker {
    pub fn new(db: Db, custodian: Arc<dyn CustodianClient>, staleness: Duration, metrics: MetricsCollector) -> Self {
        Self {
            db,
            custodian,
            staleness,
            metrics,
        }
    }

    pub async fn tick(&self) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await?;

        let cutoff = Utc::now() - chrono::Duration::from_std(self.staleness).unwrap();
        let row: Option<(uuid::Uuid, String)> = sqlx::query_as(
            "SELECT id, transaction_id FROM claim_drain
             WHERE status = $1 AND transaction_id IS NOT NULL AND updated_at < $2
             ORDER BY updated_at ASC
             FOR UPDATE SKIP LOCKED
             LIMIT 1",
        )
        .bind(drain_status::GEMINI_PENDING)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((job_id, tx_id)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        match self.custodian.tx_status(&tx_id).await {
            Ok(TxStatus::Complete) => {
                sqlx::query(
                    "UPDATE claim_drain SET status = $1, completed = true, completed_at = now(), updated_at = now()
                     WHERE id = $2",
                )
                .bind(drain_status::COMPLETE)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
                self.metrics.increment(metrics::DRAIN_COMPLETED, 1).await;
            }
            Ok(TxStatus::Pending) => {
                sqlx::query("UPDATE claim_drain SET updated_at = now() WHERE id = $1")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Ok(TxStatus::Failed(note)) => {
                sqlx::query(
                    "UPDATE claim_drain SET erred = true, err_code = $1, status = $2, updated_at = now()
                     WHERE id = $3",
                )
                .bind(&note)
                .bind(drain_status::FAILED)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
                self.metrics.increment(metrics::DRAIN_FAILED, 1).await;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "poll checker: tx_status call failed, will retry");
                sqlx::query("UPDATE claim_drain SET updated_at = now() WHERE id = $1")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        self.metrics.increment(metrics::DRAIN_POLL_CHECKED, 1).await;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "poll checker tick failed");
            }
        }
    }
}
