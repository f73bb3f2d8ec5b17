//! Accepts suggestion submissions backed by redeemable credentials and
//! serializes their redemption and publication.
//!
//! The process-local pause flag is grounded in
//! `control-plane/src/alerting.rs::AlertManager`'s `Arc<RwLock<...>>`
//! per-instance cooldown state: explicit on the worker, never ambient.

use crate::clients::{IssuerClient, Publisher};
use crate::db::Db;
use crate::models::{CredentialBinding, SuggestionJob};
use crate::observability::{metrics, MetricsCollector};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct SuggestionPipeline {
    db: Db,
    issuer_client: Arc<dyn IssuerClient>,
    publisher: Arc<dyn Publisher>,
    metrics: MetricsCollector,
    paused_until: Arc<RwLock<Option<DateTime<Utc>>>>,
    pause_duration: Duration,
}

impl SuggestionPipeline {
    pub fn new(
        db: Db,
        issuer_client: Arc<dyn IssuerClient>,
        publisher: Arc<dyn Publisher>,
        metrics: MetricsCollector,
        pause_duration: Duration,
    ) -> Self {
        Self {
            db,
            issuer_client,
            publisher,
            metrics,
            paused_until: Arc::new(RwLock::new(None)),
            pause_duration,
        }
    }

    pub async fn submit(
        &self,
        credentials: Vec<CredentialBinding>,
        suggestion_text: String,
        suggestion_event: serde_json::Value,
    ) -> anyhow::Result<()> {
        let binding = serde_json::to_value(&credentials)?;
        sqlx::query(
            "INSERT INTO suggestion_drain (credentials_binding, suggestion_text, suggestion_event)
             VALUES ($1, $2, $3)",
        )
        .bind(&binding)
        .bind(&suggestion_text)
        .bind(&suggestion_event)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn is_paused(&self) -> bool {
        match *self.paused_until.read().await {
            Some(resume_at) => Utc::now() < resume_at,
            None => false,
        }
    }

    async fn pause(&self) {
        let resume_at = Utc::now() + chrono::Duration::from_std(self.pause_duration).unwrap();
        *self.paused_until.write().await = Some(resume_at);
        tracing::warn!(resume_at = %resume_at, "suggestion pipeline paused after expired-credential error");
    }

    /// Returns `true` if a job was claimed (attempted), regardless of outcome.
    pub async fn tick(&self) -> anyhow::Result<bool> {
        if self.is_paused().await {
            tracing::debug!("suggestion pipeline tick skipped: paused");
            return Ok(false);
        }

        let mut tx = self.db.begin().await?;
        let job = sqlx::query_as::<_, SuggestionJob>(
            "SELECT * FROM suggestion_drain WHERE NOT erred FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some(job) = job else {
            tx.rollback().await?;
            return Ok(false);
        };

        let skip_redeem = job.err_code.as_deref() == Some("cbr_dup_redeem");
        let credentials: Vec<CredentialBinding> = serde_json::from_value(job.credentials_binding.clone())?;

        let redeem_result = if skip_redeem {
            Ok(())
        } else {
            self.issuer_client.redeem_credentials(&credentials).await
        };

        match redeem_result {
            Ok(()) => {
                self.publisher
                    .publish("suggestion", &job.suggestion_event)
                    .await?;
                sqlx::query("DELETE FROM suggestion_drain WHERE id = $1")
                    .bind(job.id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                self.metrics.increment(metrics::SUGGESTION_REDEEMED, 1).await;
            }
            Err(e) => {
                let message = e.to_string();
                let err_code = if message.contains("dup") {
                    "cbr_dup_redeem"
                } else {
                    "redeem_failed"
                };
                sqlx::query("UPDATE suggestion_drain SET erred = true, err_code = $1 WHERE id = $2")
                    .bind(err_code)
                    .bind(job.id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                self.metrics.increment(metrics::SUGGESTION_ERRORS, 1).await;
                if message.to_lowercase().contains("expired") {
                    self.pause().await;
                }
            }
        }

        Ok(true)
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "suggestion pipeline tick failed");
            }
        }
    }
}
