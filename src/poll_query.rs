//! Read-side aggregation over drain jobs and claims, grounded in the
//! aggregate-query style of `control-plane/src/handlers/bots.rs::get_metrics`.

use crate::db::Db;
use crate::models::{bd_to_dec, CustodianDrainSummary, DrainPollResponse, DrainPollStatus};
use bigdecimal::BigDecimal;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

pub struct PollQuery {
    db: Db,
}

impl PollQuery {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// `GetDrainPoll`: aggregates every job in a batch into one status.
    pub async fn get_drain_poll(&self, batch_id: Uuid) -> anyhow::Result<DrainPollResponse> {
        let rows: Vec<(bool, bool)> =
            sqlx::query_as("SELECT completed, erred FROM claim_drain WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_all(&self.db)
                .await?;

        let status = if rows.is_empty() {
            DrainPollStatus::Unknown
        } else if rows.iter().all(|(completed, _)| *completed) {
            DrainPollStatus::Complete
        } else if rows.iter().any(|(_, erred)| *erred) {
            DrainPollStatus::Delayed
        } else if rows.iter().all(|(completed, _)| !*completed) {
            DrainPollStatus::Pending
        } else {
            DrainPollStatus::InProgress
        };

        Ok(DrainPollResponse { status })
    }

    /// `GetCustodianDrainInfo`: groups a wallet's drain jobs by batch and
    /// summarizes promotions drained and total value per batch.
    pub async fn get_custodian_drain_info(&self, wallet_id: Uuid) -> anyhow::Result<Vec<CustodianDrainSummary>> {
        let rows: Vec<(Uuid, String, BigDecimal, Option<Uuid>)> = sqlx::query_as(
            "SELECT cd.batch_id, cd.deposit_provider, cd.total, c.promotion_id
             FROM claim_drain cd
             LEFT JOIN claims c ON c.id = cd.claim_id
             WHERE cd.wallet_id = $1",
        )
        .bind(wallet_id)
        .fetch_all(&self.db)
        .await?;

        let mut by_batch: std::collections::BTreeMap<Uuid, (String, HashSet<Uuid>, Decimal)> =
            std::collections::BTreeMap::new();
        for (batch_id, provider, total, promotion_id) in rows {
            let entry = by_batch.entry(batch_id).or_insert_with(|| (provider.clone(), HashSet::new(), Decimal::ZERO));
            entry.2 += bd_to_dec(&total);
            if let Some(pid) = promotion_id {
                entry.1.insert(pid);
            }
        }

        Ok(by_batch
            .into_iter()
            .map(|(batch_id, (custodian, promotions, total_value))| CustodianDrainSummary {
                batch_id,
                custodian,
                promotions_drained: promotions.into_iter().collect(),
                total_value,
            })
            .collect())
    }

    /// `GetClaimSummary`: sums `approximateValue - bonus` across redeemed or
    /// legacy-claimed claims of the given type, excluding configured
    /// transfer promotions.
    pub async fn get_claim_summary(
        &self,
        wallet_id: Uuid,
        promotion_type: &str,
        excluded_promotion_ids: &[Uuid],
    ) -> anyhow::Result<Option<(Decimal, chrono::DateTime<chrono::Utc>)>> {
        let row: Option<(BigDecimal, BigDecimal, Option<chrono::DateTime<chrono::Utc>>)> = sqlx::query_as(
            "SELECT COALESCE(SUM(c.approximate_value), 0), COALESCE(SUM(c.bonus), 0), MAX(c.redeemed_at)
             FROM claims c
             JOIN promotions p ON p.id = c.promotion_id
             WHERE c.wallet_id = $1 AND p.promotion_type = $2
               AND (c.redeemed OR c.legacy_claimed)
               AND NOT (c.promotion_id = ANY($3))",
        )
        .bind(wallet_id)
        .bind(promotion_type)
        .bind(excluded_promotion_ids)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.and_then(|(value, bonus, last_claim)| {
            last_claim.map(|last_claim| (bd_to_dec(&value) - bd_to_dec(&bonus), last_claim))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(rows: &[(bool, bool)]) -> DrainPollStatus {
        if rows.is_empty() {
            DrainPollStatus::Unknown
        } else if rows.iter().all(|(completed, _)| *completed) {
            DrainPollStatus::Complete
        } else if rows.iter().any(|(_, erred)| *erred) {
            DrainPollStatus::Delayed
        } else if rows.iter().all(|(completed, _)| !*completed) {
            DrainPollStatus::Pending
        } else {
            DrainPollStatus::InProgress
        }
    }

    #[test]
    fn poll_status_aggregation_matches_spec_rules() {
        assert_eq!(status_of(&[]), DrainPollStatus::Unknown);
        assert_eq!(status_of(&[(true, false), (true, false)]), DrainPollStatus::Complete);
        assert_eq!(status_of(&[(false, true), (true, false)]), DrainPollStatus::Delayed);
        assert_eq!(status_of(&[(false, false), (false, false)]), DrainPollStatus::Pending);
        assert_eq!(status_of(&[(true, false), (false, false)]), DrainPollStatus::InProgress);
    }
}
