//! `BatchSubmitter` (provider B): submits a batch of `prepared` jobs as one
//! aggregate transfer, guarded by a Postgres advisory lock keyed by the
//! batch id so at most one submitter works a given batch at a time.

use crate::clients::CustodianClient;
use crate::db::Db;
use crate::drain::classify;
use crate::models::drain_status;
use crate::observability::{metrics, MetricsCollector};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct BatchSubmitter {
    db: Db,
    custodian: Arc<dyn CustodianClient>,
    metrics: MetricsCollector,
}

impl BatchSubmitter {
    pub fn new(db: Db, custodian: Arc<dyn CustodianClient>, metrics: MetricsCollector) -> Self {
        Self { db, custodian, metrics }
    }

    /// Finds one batch where every job is `prepared`, has a transaction id,
    /// and none has erred, then submits it.
    pub async fn tick(&self) -> anyhow::Result<bool> {
        let candidate: Option<(Uuid,)> = sqlx::query_as(
            "SELECT batch_id FROM claim_drain
             WHERE deposit_provider = $1
             GROUP BY batch_id
             HAVING bool_and(status = 'prepared') AND bool_and(transaction_id IS NOT NULL) AND bool_and(NOT erred)
             LIMIT 1",
        )
        .bind(self.custodian.provider_name())
        .fetch_optional(&self.db)
        .await?;

        let Some((batch_id,)) = candidate else {
            return Ok(false);
        };

        let mut tx = self.db.begin().await?;

        // Advisory lock keyed by the batch id so only one submitter enters
        // this batch until commit; `hashtext` folds the uuid into an i32.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        // Re-check under the lock: another submitter may have already moved
        // this batch out of `prepared` between the SELECT above and the lock.
        let still_prepared: (bool,) = sqlx::query_as(
            "SELECT bool_and(status = 'prepared') AND bool_and(NOT erred)
             FROM claim_drain WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await?;
        if !still_prepared.0 {
            tx.rollback().await?;
            return Ok(false);
        }

        match self.custodian.submit_batch_transfer(batch_id).await {
            Ok(()) => {
                sqlx::query("UPDATE claim_drain SET status = $1, updated_at = now() WHERE batch_id = $2")
                    .bind(drain_status::SUBMITTED)
                    .bind(batch_id)
                    .execute(&mut *tx)
                    .await?;
                self.metrics.increment(metrics::DRAIN_BATCH_SUBMITTED, 1).await;
            }
            Err(e) => {
                let classification = classify::classify_custodian_error(&e);
                sqlx::query(
                    "UPDATE claim_drain SET erred = true, err_code = $1, status = $2, updated_at = now()
                     WHERE batch_id = $3",
                )
                .bind(&classification.err_code)
                .bind(classification.status)
                .bind(batch_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Marks every job in a confirmed-submitted batch complete, once the
    /// custodian signals settlement out of band.
    pub async fn mark_batch_complete(&self, batch_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE claim_drain SET status = $1, completed = true, completed_at = now(), updated_at = now()
             WHERE batch_id = $2 AND status = $3",
        )
        .bind(drain_status::COMPLETE)
        .bind(batch_id)
        .bind(drain_status::SUBMITTED)
        .execute(&self.db)
        .await?;
        if result.rows_affected() > 0 {
            self.metrics.increment(metrics::DRAIN_COMPLETED, result.rows_affected()).await;
        }
        Ok(result.rows_affected())
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "batch submitter tick failed");
            }
        }
    }
}
