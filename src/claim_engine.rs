//! Grant-pool decrement and per-wallet claim uniqueness.
//!
//! `claim_promotion` follows the serializable-transaction shape of
//! `control-plane/src/handlers/bots.rs::create_bot`: lock/guard, conditional
//! early-return with rollback, several writes, commit.

use crate::errors::CoreError;
use crate::models::{Claim, ClaimCredentials};
use crate::observability::{metrics, MetricsCollector};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

pub struct ClaimEngine {
    db: PgPool,
    grant_activity_window: Duration,
    metrics: MetricsCollector,
}

impl ClaimEngine {
    pub fn new(db: PgPool, grant_activity_window: Duration, metrics: MetricsCollector) -> Self {
        Self {
            db,
            grant_activity_window,
            metrics,
        }
    }

    /// `ClaimPromotion`: returns the claim id, idempotent under retry with
    /// identical `blinded_tokens` (position-sensitive equality, I3).
    pub async fn claim_promotion(
        &self,
        promotion_id: Uuid,
        wallet_id: Uuid,
        blinded_tokens: Vec<String>,
    ) -> Result<Uuid, CoreError> {
        let mut tx = self.db.begin().await?;

        let promotion: Option<(BigDecimal, String)> = sqlx::query_as(
            "SELECT approximate_value, promotion_type FROM promotions WHERE id = $1 FOR UPDATE",
        )
        .bind(promotion_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((approximate_value, promotion_type)) = promotion else {
            tx.rollback().await?;
            return Err(CoreError::NoMatchingActivePromotion);
        };

        let legacy = sqlx::query_as::<_, Claim>(
            "SELECT * FROM claims WHERE promotion_id = $1 AND wallet_id = $2 AND legacy_claimed
             FOR UPDATE",
        )
        .bind(promotion_id)
        .bind(wallet_id)
        .fetch_all(&mut *tx)
        .await?;
        if legacy.len() > 1 {
            tx.rollback().await?;
            return Err(CoreError::Internal(anyhow::anyhow!(
                "invariant violation: multiple legacy claims for promotion {promotion_id} wallet {wallet_id}"
            )));
        }

        let claim_id = if let Some(existing) = legacy.into_iter().next() {
            sqlx::query(
                "UPDATE claims SET redeemed = true, redeemed_at = now()
                 WHERE id = $1 AND NOT redeemed",
            )
            .bind(existing.id)
            .execute(&mut *tx)
            .await?;
            existing.id
        } else if promotion_type == "ads" {
            // type=ads promotions are only claimable via a pre-registered
            // legacy claim; there is no grant pool to decrement into.
            tx.rollback().await?;
            return Err(CoreError::NoMatchingActivePromotion);
        } else {
            let window_days = self.grant_activity_window.as_secs() as i64 / 86_400;
            let cutoff: DateTime<Utc> = Utc::now() - ChronoDuration::days(window_days);

            let decremented = sqlx::query(
                "UPDATE promotions SET remaining_grants = remaining_grants - 1
                 WHERE id = $1 AND active AND remaining_grants > 0 AND created_at > $2",
            )
            .bind(promotion_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
            if decremented.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(CoreError::NoMatchingActivePromotion);
            }

            let (new_id,): (Uuid,) = sqlx::query_as(
                "INSERT INTO claims (id, promotion_id, wallet_id, approximate_value, bonus, redeemed, redeemed_at)
                 VALUES (gen_random_uuid(), $1, $2, $3, 0, true, now())
                 RETURNING id",
            )
            .bind(promotion_id)
            .bind(wallet_id)
            .bind(&approximate_value)
            .fetch_one(&mut *tx)
            .await?;
            new_id
        };

        let existing_creds = sqlx::query_as::<_, ClaimCredentials>(
            "SELECT * FROM claim_creds WHERE claim_id = $1",
        )
        .bind(claim_id)
        .fetch_optional(&mut *tx)
        .await?;

        let incoming = serde_json::to_value(&blinded_tokens)
            .map_err(|e| CoreError::Internal(anyhow::anyhow!(e)))?;

        match existing_creds {
            Some(row) if row.blinded_tokens == incoming => {
                // Same retry: nothing new to write, fall through to commit.
            }
            Some(_) => {
                tx.rollback().await?;
                self.metrics.increment(metrics::CLAIM_CONFLICT, 1).await;
                return Err(CoreError::ClaimedDifferentBlindCreds);
            }
            None => {
                sqlx::query(
                    "INSERT INTO claim_creds (claim_id, cohort, blinded_tokens)
                     VALUES ($1, 'control', $2)
                     ON CONFLICT (claim_id) DO NOTHING",
                )
                .bind(claim_id)
                .bind(&incoming)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(claim_id)
    }

    pub async fn get_claim(&self, claim_id: Uuid) -> Result<Option<(Claim, ClaimCredentials)>, CoreError> {
        let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE id = $1")
            .bind(claim_id)
            .fetch_optional(&self.db)
            .await?;
        let Some(claim) = claim else { return Ok(None) };
        let creds = sqlx::query_as::<_, ClaimCredentials>(
            "SELECT * FROM claim_creds WHERE claim_id = $1",
        )
        .bind(claim_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(creds.map(|c| (claim, c)))
    }

    /// `SuggestionsNeeded`: banker's rounding (half-to-even) at 0.005
    /// granularity, floored at 1. See SPEC_FULL.md §8 for the boundary table
    /// this implements.
    pub fn suggestions_needed(
        claim_value: Decimal,
        promotion_value: Decimal,
        suggestions_per_grant: Decimal,
    ) -> u32 {
        if promotion_value.is_zero() {
            return 1;
        }
        let raw = claim_value * suggestions_per_grant / promotion_value;
        let rounded = raw.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
        let needed = rounded.to_string().parse::<i64>().unwrap_or(0).max(1);
        needed as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn needed(claim_value: Decimal) -> u32 {
        ClaimEngine::suggestions_needed(claim_value, dec!(10), dec!(40))
    }

    #[test]
    fn boundary_table_matches_spec() {
        assert_eq!(needed(dec!(0.1)), 1);
        assert_eq!(needed(dec!(5.0)), 20);
        assert_eq!(needed(dec!(5.1)), 20);
        assert_eq!(needed(dec!(5.124)), 20);
        assert_eq!(needed(dec!(5.125)), 21);
        assert_eq!(needed(dec!(5.24)), 21);
        assert_eq!(needed(dec!(5.25)), 21);
    }

    #[test]
    fn zero_promotion_value_floors_to_one() {
        assert_eq!(
            ClaimEngine::suggestions_needed(dec!(5), Decimal::ZERO, dec!(40)),
            1
        );
    }

    #[test]
    fn blinded_tokens_equality_is_position_sensitive() {
        let a = serde_json::to_value(vec!["a", "b", "c"]).unwrap();
        let b = serde_json::to_value(vec!["b", "a", "c"]).unwrap();
        let c = serde_json::to_value(vec!["a", "b", "c"]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
