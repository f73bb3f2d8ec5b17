//! Consumes pending `claim_creds` rows and turns blinded tokens into signed
//! credentials via the `IssuerClient`.
//!
//! Loop shape grounded in `control-plane/src/provisioning.rs::spawn_cleanup_task`:
//! a `tokio::spawn` task ticking on a `tokio::time::interval`, each tick a
//! short transaction guarded by `FOR UPDATE SKIP LOCKED`.

use crate::clients::IssuerClient;
use crate::db::Db;
use crate::observability::{metrics, MetricsCollector};
use std::sync::Arc;
use std::time::Duration;

pub struct SigningWorker {
    db: Db,
    issuer_client: Arc<dyn IssuerClient>,
    metrics: MetricsCollector,
}

impl SigningWorker {
    pub fn new(db: Db, issuer_client: Arc<dyn IssuerClient>, metrics: MetricsCollector) -> Self {
        Self {
            db,
            issuer_client,
            metrics,
        }
    }

    /// Attempts to sign one pending row. Returns `true` if a row was claimed
    /// (regardless of whether signing itself succeeded).
    pub async fn tick(&self) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await?;

        let row: Option<(uuid::Uuid, String, serde_json::Value)> = sqlx::query_as(
            "SELECT cc.claim_id, cc.cohort, cc.blinded_tokens
             FROM claim_creds cc
             WHERE cc.signed_tokens IS NULL
             FOR UPDATE SKIP LOCKED
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((claim_id, cohort, blinded_tokens)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let promotion_id: Option<(uuid::Uuid,)> =
            sqlx::query_as("SELECT promotion_id FROM claims WHERE id = $1")
                .bind(claim_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((promotion_id,)) = promotion_id else {
            tx.rollback().await?;
            return Ok(true);
        };

        let issuer_name = crate::models::Issuer::external_name_for(promotion_id, &cohort);

        let signed = match self
            .issuer_client
            .sign_credentials(&issuer_name, &blinded_tokens)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tx.rollback().await?;
                tracing::warn!(claim_id = %claim_id, error = %e, "credential signing failed, will retry");
                return Ok(true);
            }
        };

        sqlx::query(
            "UPDATE claim_creds SET signed_tokens = $1, batch_proof = $2, public_key = $3
             WHERE claim_id = $4",
        )
        .bind(&signed.signed)
        .bind(&signed.batch_proof)
        .bind(&signed.public_key)
        .bind(claim_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.metrics.increment(metrics::CLAIM_CREDENTIALS_SIGNED, 1).await;
        tracing::debug!(claim_id = %claim_id, "claim credentials signed");
        Ok(true)
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "signing worker tick failed"),
            }
        }
    }
}
