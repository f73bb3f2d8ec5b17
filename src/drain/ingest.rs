//! `DrainIngest`: validates a drain request, groups credentials by their
//! originating claim, and inserts one `DrainJob` per claim under a freshly
//! minted `batchId`.

use crate::clients::{ReputationClient, WalletService};
use crate::db::Db;
use crate::errors::CoreError;
use crate::models::{bd_to_dec, dec_to_bd, CredentialBinding};
use bigdecimal::BigDecimal;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// The fixed per-credential redemption value used by the upstream protocol
/// (each credential redeems for a quarter unit).
pub const CREDENTIAL_UNIT_VALUE: &str = "0.25";

pub struct DrainIngest {
    db: Db,
    wallet_service: Arc<dyn WalletService>,
    reputation: Arc<dyn ReputationClient>,
    withdrawal_limit_total: Decimal,
}

impl DrainIngest {
    pub fn new(
        db: Db,
        wallet_service: Arc<dyn WalletService>,
        reputation: Arc<dyn ReputationClient>,
        withdrawal_limit_total: Decimal,
    ) -> Self {
        Self {
            db,
            wallet_service,
            reputation,
            withdrawal_limit_total,
        }
    }

    pub async fn drain(
        &self,
        wallet_id: Uuid,
        credentials: Vec<CredentialBinding>,
    ) -> Result<Uuid, CoreError> {
        let wallet = self
            .wallet_service
            .get_wallet(wallet_id)
            .await
            .map_err(CoreError::Internal)?
            .ok_or(CoreError::NotFound)?;

        let reputable = self
            .reputation
            .is_wallet_reputable(wallet_id)
            .await
            .map_err(|_| CoreError::ReputationServiceFailure)?;
        if !reputable {
            return Err(CoreError::WalletNotReputable);
        }

        let unit_value: Decimal = CREDENTIAL_UNIT_VALUE.parse().expect("constant parses");
        let total = unit_value * Decimal::from(credentials.len() as u64);

        let already_drained: Option<(BigDecimal,)> = sqlx::query_as(
            "SELECT COALESCE(SUM(total), 0) FROM claim_drain WHERE wallet_id = $1 AND NOT erred",
        )
        .bind(wallet_id)
        .fetch_optional(&self.db)
        .await?;
        let already_drained = already_drained.map(|(v,)| bd_to_dec(&v)).unwrap_or(Decimal::ZERO);
        if already_drained + total > self.withdrawal_limit_total {
            return Err(CoreError::ExceededWithdrawalLimit);
        }

        let claim_by_issuer = self.resolve_claim_ids(wallet_id, &credentials).await?;
        let by_claim = group_by_claim(&credentials, &claim_by_issuer);
        if by_claim.is_empty() {
            return Err(CoreError::Validation("no redeemable credentials".to_string()));
        }

        let batch_id = Uuid::new_v4();
        let mut tx = self.db.begin().await?;

        for (claim_id, group) in by_claim {
            let binding = serde_json::to_value(&group).map_err(|e| CoreError::Internal(anyhow::anyhow!(e)))?;
            let group_total = unit_value * Decimal::from(group.len() as u64);
            sqlx::query(
                "INSERT INTO claim_drain
                    (wallet_id, claim_id, credentials_binding, total, batch_id, deposit_provider, deposit_destination)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(wallet_id)
            .bind(claim_id)
            .bind(&binding)
            .bind(dec_to_bd(group_total))
            .bind(batch_id)
            .bind(&wallet.deposit_provider)
            .bind(&wallet.deposit_destination)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE claims SET drained = true, drained_at = now() WHERE id = $1 AND NOT drained")
                .bind(claim_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(batch_id)
    }

    /// Resolves each credential's `issuer` (`"{promotionId}:{cohort}"`) to the
    /// claim the calling wallet holds a redeemed claim for on that promotion.
    /// Credentials that don't resolve are left out of the returned map and
    /// dropped from the batch by `group_by_claim`.
    async fn resolve_claim_ids(
        &self,
        wallet_id: Uuid,
        credentials: &[CredentialBinding],
    ) -> Result<HashMap<String, Uuid>, CoreError> {
        let promotion_ids: Vec<Uuid> = credentials
            .iter()
            .filter_map(|c| parse_promotion_id(&c.issuer))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        if promotion_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, promotion_id FROM claims
             WHERE wallet_id = $1 AND promotion_id = ANY($2) AND redeemed",
        )
        .bind(wallet_id)
        .bind(&promotion_ids)
        .fetch_all(&self.db)
        .await?;
        let claim_by_promotion: HashMap<Uuid, Uuid> = rows.into_iter().collect();

        let mut claim_by_issuer = HashMap::new();
        for cred in credentials {
            if let Some(promotion_id) = parse_promotion_id(&cred.issuer) {
                if let Some(claim_id) = claim_by_promotion.get(&promotion_id) {
                    claim_by_issuer.insert(cred.issuer.clone(), *claim_id);
                }
            }
        }
        Ok(claim_by_issuer)
    }
}

fn parse_promotion_id(issuer: &str) -> Option<Uuid> {
    let (promotion_id, _cohort) = issuer.split_once(':')?;
    Uuid::parse_str(promotion_id).ok()
}

/// Groups credentials by the claim id their issuer resolved to. Credentials
/// whose issuer didn't resolve to a redeemed claim for this wallet (absent
/// from `claim_by_issuer`) are dropped from the batch.
fn group_by_claim(
    credentials: &[CredentialBinding],
    claim_by_issuer: &HashMap<String, Uuid>,
) -> BTreeMap<Uuid, Vec<CredentialBinding>> {
    let mut groups: BTreeMap<Uuid, Vec<CredentialBinding>> = BTreeMap::new();
    for cred in credentials {
        if let Some(claim_id) = claim_by_issuer.get(&cred.issuer) {
            groups.entry(*claim_id).or_default().push(cred.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_promotion_id_splits_on_first_colon() {
        let promotion_id = Uuid::new_v4();
        let issuer = format!("{}:control", promotion_id);
        assert_eq!(parse_promotion_id(&issuer), Some(promotion_id));
        assert_eq!(parse_promotion_id("not-a-uuid:control"), None);
        assert_eq!(parse_promotion_id("no-colon"), None);
    }

    #[test]
    fn group_by_claim_drops_unresolved_credentials() {
        let claim_id = Uuid::new_v4();
        let resolved_issuer = format!("{}:control", Uuid::new_v4());
        let mut claim_by_issuer = HashMap::new();
        claim_by_issuer.insert(resolved_issuer.clone(), claim_id);

        let credentials = vec![
            CredentialBinding {
                issuer: resolved_issuer,
                token_preimage: "a".to_string(),
                signature: "sig-a".to_string(),
            },
            CredentialBinding {
                issuer: format!("{}:control", Uuid::new_v4()),
                token_preimage: "b".to_string(),
                signature: "sig-b".to_string(),
            },
        ];

        let groups = group_by_claim(&credentials, &claim_by_issuer);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.get(&claim_id).map(Vec::len), Some(1));
    }
}
