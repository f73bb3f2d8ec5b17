//! Binds a promotion+cohort to an anonymous-credential issuer key.
//!
//! Grounded in the insert-after-external-call ordering of
//! `control-plane/src/handlers/bots.rs::create_bot`: no row is written until
//! the external call (here, `IssuerClient::create_issuer` +
//! `get_issuer_public_key`) has succeeded, so a failed call leaves no partial
//! state.

use crate::clients::IssuerClient;
use crate::db::Db;
use crate::models::Issuer;
use std::sync::Arc;
use uuid::Uuid;

pub struct IssuerRegistry {
    db: Db,
    issuer_client: Arc<dyn IssuerClient>,
}

impl IssuerRegistry {
    pub fn new(db: Db, issuer_client: Arc<dyn IssuerClient>) -> Self {
        Self { db, issuer_client }
    }

    pub async fn get_or_create_issuer(
        &self,
        promotion_id: Uuid,
        cohort: &str,
    ) -> anyhow::Result<Issuer> {
        if let Some(issuer) = sqlx::query_as::<_, Issuer>(
            "SELECT promotion_id, cohort, public_key, external_name, created_at
             FROM issuers WHERE promotion_id = $1 AND cohort = $2",
        )
        .bind(promotion_id)
        .bind(cohort)
        .fetch_optional(&self.db)
        .await?
        {
            return Ok(issuer);
        }

        let external_name = Issuer::external_name_for(promotion_id, cohort);
        self.issuer_client.create_issuer(&external_name, 4_000_000).await?;
        let public_key = self
            .issuer_client
            .get_issuer_public_key(&external_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("issuer client reported no public key for {external_name}"))?;

        let issuer = sqlx::query_as::<_, Issuer>(
            "INSERT INTO issuers (promotion_id, cohort, public_key, external_name)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (promotion_id, cohort) DO UPDATE SET public_key = EXCLUDED.public_key
             RETURNING promotion_id, cohort, public_key, external_name, created_at",
        )
        .bind(promotion_id)
        .bind(cohort)
        .bind(&public_key)
        .bind(&external_name)
        .fetch_one(&self.db)
        .await?;

        Ok(issuer)
    }
}
