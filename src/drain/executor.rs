//! `DrainExecutor`: dispatches one initialized `DrainJob` to its provider's
//! `CustodianClient` and records the resulting status.
//!
//! Loop shape grounded in `control-plane/src/provisioning.rs`; the row lock +
//! external call + commit pattern grounded in
//! `control-plane/src/handlers/bots.rs::create_bot`.

use crate::clients::{CustodianClient, TransferOutcome};
use crate::db::Db;
use crate::drain::classify;
use crate::models::{bd_to_dec, drain_status, DrainJob};
use crate::observability::{metrics, MetricsCollector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct DrainExecutor {
    db: Db,
    custodians: HashMap<String, Arc<dyn CustodianClient>>,
    metrics: MetricsCollector,
}

impl DrainExecutor {
    pub fn new(db: Db, custodians: HashMap<String, Arc<dyn CustodianClient>>, metrics: MetricsCollector) -> Self {
        Self {
            db,
            custodians,
            metrics,
        }
    }

    pub async fn tick(&self) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await?;

        let job = sqlx::query_as::<_, DrainJob>(
            "SELECT * FROM claim_drain
             WHERE NOT erred AND transaction_id IS NULL
               AND (status IS NULL OR status NOT IN ('complete', 'reputation-failed', 'failed', 'prepared', 'gemini-pending', 'submitted'))
             FOR UPDATE SKIP LOCKED
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE claim_drain SET status = $1, updated_at = now() WHERE id = $2")
            .bind(drain_status::INITIALIZED)
            .bind(job.id)
            .execute(&mut *tx)
            .await?;

        let Some(custodian) = self.custodians.get(&job.deposit_provider) else {
            sqlx::query(
                "UPDATE claim_drain SET erred = true, err_code = 'unknown_provider', status = 'failed', updated_at = now()
                 WHERE id = $1",
            )
            .bind(job.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(true);
        };

        let result = custodian
            .redeem_and_transfer(&job.credentials_binding, &job.deposit_destination, bd_to_dec(&job.total))
            .await;

        match result {
            Ok(transfer) => {
                match transfer.outcome {
                    TransferOutcome::PreparedForBatch => {
                        sqlx::query(
                            "UPDATE claim_drain SET transaction_id = $1, status = $2, updated_at = now()
                             WHERE id = $3",
                        )
                        .bind(&transfer.tx_id)
                        .bind(drain_status::PREPARED)
                        .bind(job.id)
                        .execute(&mut *tx)
                        .await?;
                    }
                    TransferOutcome::Pending => {
                        sqlx::query(
                            "UPDATE claim_drain SET transaction_id = $1, status = $2, updated_at = now()
                             WHERE id = $3",
                        )
                        .bind(&transfer.tx_id)
                        .bind(drain_status::GEMINI_PENDING)
                        .bind(job.id)
                        .execute(&mut *tx)
                        .await?;
                    }
                    TransferOutcome::Complete => {
                        sqlx::query(
                            "UPDATE claim_drain
                             SET transaction_id = $1, status = $2, completed = true, completed_at = now(), updated_at = now()
                             WHERE id = $3",
                        )
                        .bind(&transfer.tx_id)
                        .bind(drain_status::COMPLETE)
                        .bind(job.id)
                        .execute(&mut *tx)
                        .await?;
                        self.metrics.increment(metrics::DRAIN_COMPLETED, 1).await;
                    }
                }
            }
            Err(e) => {
                let classification = classify::classify(&e);
                sqlx::query(
                    "UPDATE claim_drain SET erred = true, err_code = $1, status = $2, updated_at = now()
                     WHERE id = $3",
                )
                .bind(&classification.err_code)
                .bind(classification.status)
                .bind(job.id)
                .execute(&mut *tx)
                .await?;
                // WalletNotReputable, ExceededWithdrawalLimit and DupRedeem are
                // expected outcomes, not incidents: only log/count the rest.
                let reported = !matches!(
                    classification.err_code.as_str(),
                    "reputation-failed" | "exceeded-withdrawal-limit" | "cbr_dup_redeem"
                );
                if reported {
                    tracing::warn!(job_id = %job.id, err_code = %classification.err_code, "drain executor: transfer failed");
                    self.metrics.increment(metrics::DRAIN_FAILED, 1).await;
                }
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "drain executor tick failed");
            }
        }
    }
}
