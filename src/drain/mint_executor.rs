//! `MintExecutor`: for a legacy-transfer `MintJob` whose per-promotion
//! totals are all recorded and whose related claims are all drained, mints
//! the aggregate grant to the wallet's deposit destination.
//!
//! Resolves the Open Question in SPEC_FULL.md §9: on failure the
//! transaction is rolled back, never committed (rollback-only).

use crate::clients::{IssuerClient, WalletService};
use crate::db::Db;
use crate::models::bd_to_dec;
use crate::observability::{metrics, MetricsCollector};
use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct MintExecutor {
    db: Db,
    issuer_client: Arc<dyn IssuerClient>,
    wallet_service: Arc<dyn WalletService>,
    metrics: MetricsCollector,
}

impl MintExecutor {
    pub fn new(
        db: Db,
        issuer_client: Arc<dyn IssuerClient>,
        wallet_service: Arc<dyn WalletService>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            db,
            issuer_client,
            wallet_service,
            metrics,
        }
    }

    pub async fn tick(&self) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await?;

        let job: Option<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT md.id, md.wallet_id
             FROM mint_drain md
             WHERE NOT md.erred AND md.status = 'pending' AND md.done
               AND NOT EXISTS (
                   SELECT 1 FROM mint_drain_promotion mdp
                   JOIN claims c ON c.promotion_id = mdp.promotion_id AND c.wallet_id = mdp.wallet_id
                   WHERE mdp.mint_drain_id = md.id AND mdp.wallet_id = md.wallet_id AND NOT c.drained
               )
             FOR UPDATE SKIP LOCKED
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((mint_id, wallet_id)) = job else {
            tx.rollback().await?;
            return Ok(false);
        };

        let totals: Vec<(Uuid, BigDecimal)> = sqlx::query_as(
            "SELECT promotion_id, total FROM mint_drain_promotion WHERE mint_drain_id = $1 AND wallet_id = $2",
        )
        .bind(mint_id)
        .bind(wallet_id)
        .fetch_all(&mut *tx)
        .await?;

        let promotion_ids: Vec<Uuid> = totals.iter().map(|(id, _)| *id).collect();
        let total: rust_decimal::Decimal = totals.iter().map(|(_, v)| bd_to_dec(v)).sum();

        let wallet = match self.wallet_service.get_wallet(wallet_id).await {
            Ok(Some(w)) => w,
            Ok(None) => {
                tx.rollback().await?;
                tracing::warn!(wallet_id = %wallet_id, "mint executor: wallet not found, will retry");
                return Ok(true);
            }
            Err(e) => {
                tx.rollback().await?;
                tracing::warn!(wallet_id = %wallet_id, error = %e, "mint executor: wallet lookup failed, will retry");
                return Ok(true);
            }
        };

        match self
            .issuer_client
            .mint_grant(&wallet.deposit_destination, total, &promotion_ids)
            .await
        {
            Ok(()) => {
                sqlx::query("UPDATE mint_drain SET status = 'complete' WHERE id = $1 AND wallet_id = $2")
                    .bind(mint_id)
                    .bind(wallet_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                self.metrics.increment(metrics::MINT_COMPLETED, 1).await;
            }
            Err(e) => {
                // Open Question resolved rollback-only: abandon the
                // transaction rather than committing a partial failure
                // marker, leaving the job `pending` for the next tick.
                tx.rollback().await?;
                tracing::warn!(mint_id = %mint_id, error = %e, "mint executor: mint_grant failed, will retry");
                sqlx::query("UPDATE mint_drain SET erred = true WHERE id = $1 AND wallet_id = $2")
                    .bind(mint_id)
                    .bind(wallet_id)
                    .execute(&self.db)
                    .await?;
                self.metrics.increment(metrics::MINT_FAILED, 1).await;
            }
        }

        Ok(true)
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "mint executor tick failed");
            }
        }
    }
}
