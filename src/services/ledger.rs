//! Credit ledger
//!
//! The only writer of `credits_balance`. Every change is a transaction row
//! plus a balance increment, applied together by the store.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::Principal;
use crate::domain::{next_balance, CreditTransaction};
use crate::logging::{AuditEvent, AuditEventType, AuditLogger};
use crate::store::Store;
use crate::types::{CheckpointError, Result};

/// Transactions shown alongside the balance
pub const RECENT_TRANSACTIONS: usize = 5;

pub const SIMULATED_USAGE_DESCRIPTION: &str = "Verification Usage (Simulation)";

const DEFAULT_TOP_UP_DESCRIPTION: &str = "Credit Top-up";

#[derive(Debug, Clone, Serialize)]
pub struct CreditsView {
    pub balance: i64,
    pub transactions: Vec<CreditTransaction>,
}

pub struct CreditLedger {
    store: Arc<dyn Store>,
    audit: AuditLogger,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn Store>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    /// Apply a signed amount. Returns the balance after the change.
    /// Negative amounts and negative balances are allowed.
    /// A change that would take the balance outside `i64` is `InvalidArgument`.
    pub async fn apply(&self, tenant_id: &str, amount: i64, description: &str) -> Result<i64> {
        next_balance(self.balance(tenant_id).await?, amount)?;
        let tx = CreditTransaction::new(tenant_id, amount, description);
        let balance = self.store.apply_credit(&tx).await?;
        info!(tenant_id, amount, balance, "Credits applied");
        Ok(balance)
    }

    /// Newest `limit` transactions, newest first
    pub async fn query(&self, tenant_id: &str, limit: usize) -> Result<Vec<CreditTransaction>> {
        self.store.recent_transactions(tenant_id, limit).await
    }

    pub async fn balance(&self, tenant_id: &str) -> Result<i64> {
        self.store
            .tenant_by_id(tenant_id)
            .await?
            .map(|t| t.credits_balance)
            .ok_or_else(|| CheckpointError::NotFound("Tenant not found".into()))
    }

    pub async fn credits_view(&self, principal: &Principal) -> Result<CreditsView> {
        principal.authorize("view_credits")?;
        let balance = self.balance(&principal.tenant_id).await?;
        let transactions = self.query(&principal.tenant_id, RECENT_TRANSACTIONS).await?;
        Ok(CreditsView {
            balance,
            transactions,
        })
    }

    /// Admin top-up (or correction, when negative)
    pub async fn add_credits(
        &self,
        principal: &Principal,
        amount: i64,
        description: &str,
    ) -> Result<i64> {
        principal.authorize("add_credits")?;
        let description = match description.trim() {
            "" => DEFAULT_TOP_UP_DESCRIPTION,
            trimmed => trimmed,
        };
        self.apply_audited(principal, amount, description).await
    }

    /// Deduct one credit as if a verification had run
    pub async fn simulate_usage(&self, principal: &Principal) -> Result<i64> {
        principal.authorize("simulate_usage")?;
        self.apply_audited(principal, -1, SIMULATED_USAGE_DESCRIPTION)
            .await
    }

    async fn apply_audited(
        &self,
        principal: &Principal,
        amount: i64,
        description: &str,
    ) -> Result<i64> {
        let balance = self.apply(&principal.tenant_id, amount, description).await?;
        self.audit
            .log(
                AuditEvent::new(AuditEventType::CreditsApplied)
                    .with_principal(principal)
                    .with_metadata(serde_json::json!({
                        "amount": amount,
                        "description": description,
                        "balance": balance,
                    })),
            )
            .await;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::domain::{Branding, Tenant};
    use crate::store::MemoryStore;

    async fn ledger_with_tenant(balance: i64) -> (CreditLedger, Principal) {
        let store = Arc::new(MemoryStore::new());
        let mut tenant = Tenant::new("t1".into(), "T1".into(), Branding::new());
        tenant.credits_balance = balance;
        store.insert_tenant(tenant).await;

        let principal = Principal {
            tenant_id: "t1".into(),
            subject_id: "u1".into(),
            role: Role::Admin,
        };
        (CreditLedger::new(store, AuditLogger::new()), principal)
    }

    #[tokio::test]
    async fn test_three_usages_from_ten() {
        let (ledger, principal) = ledger_with_tenant(10).await;
        for _ in 0..3 {
            ledger.apply("t1", -1, "usage").await.unwrap();
        }

        let view = ledger.credits_view(&principal).await.unwrap();
        assert_eq!(view.balance, 7);
        assert_eq!(view.transactions.len(), 3);
        assert!(view.transactions.iter().all(|t| t.amount == -1));
    }

    #[tokio::test]
    async fn test_balance_may_go_negative() {
        let (ledger, principal) = ledger_with_tenant(0).await;
        let balance = ledger.simulate_usage(&principal).await.unwrap();
        assert_eq!(balance, -1);
        let rows = ledger.query("t1", 5).await.unwrap();
        assert_eq!(rows[0].description, SIMULATED_USAGE_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_view_caps_at_five_newest() {
        let (ledger, principal) = ledger_with_tenant(0).await;
        for amount in 1..=8 {
            ledger
                .add_credits(&principal, amount, &format!("grant {}", amount))
                .await
                .unwrap();
        }

        let view = ledger.credits_view(&principal).await.unwrap();
        assert_eq!(view.balance, 36);
        let amounts: Vec<i64> = view.transactions.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![8, 7, 6, 5, 4]);
    }

    #[tokio::test]
    async fn test_blank_description_defaults() {
        let (ledger, principal) = ledger_with_tenant(0).await;
        ledger.add_credits(&principal, 5, "  ").await.unwrap();
        let rows = ledger.query("t1", 1).await.unwrap();
        assert_eq!(rows[0].description, DEFAULT_TOP_UP_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_top_up_past_max_is_refused() {
        let (ledger, principal) = ledger_with_tenant(0).await;
        assert_eq!(
            ledger.add_credits(&principal, i64::MAX, "big").await.unwrap(),
            i64::MAX
        );

        let err = ledger.add_credits(&principal, 1, "one more").await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidArgument(_)));
        assert_eq!(ledger.balance("t1").await.unwrap(), i64::MAX);
        assert_eq!(ledger.query("t1", 5).await.unwrap().len(), 1);

        assert_eq!(ledger.simulate_usage(&principal).await.unwrap(), i64::MAX - 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_not_found() {
        let (ledger, _) = ledger_with_tenant(0).await;
        let err = ledger.apply("ghost", 1, "x").await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
        assert!(matches!(
            ledger.balance("ghost").await.unwrap_err(),
            CheckpointError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_member_reads_but_cannot_write() {
        let (ledger, mut principal) = ledger_with_tenant(3).await;
        principal.role = Role::Member;

        assert_eq!(ledger.credits_view(&principal).await.unwrap().balance, 3);
        assert!(matches!(
            ledger.add_credits(&principal, 5, "x").await.unwrap_err(),
            CheckpointError::Unauthorized(_)
        ));
        assert!(matches!(
            ledger.simulate_usage(&principal).await.unwrap_err(),
            CheckpointError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_concurrent_applications_sum() {
        tokio_test::block_on(async {
            let (ledger, _) = ledger_with_tenant(10).await;
            let ledger = Arc::new(ledger);
            let tasks: Vec<_> = (0..20)
                .map(|_| {
                    let ledger = ledger.clone();
                    async move { ledger.apply("t1", -1, "usage").await }
                })
                .collect();
            for result in futures::future::join_all(tasks).await {
                result.unwrap();
            }
            assert_eq!(ledger.balance("t1").await.unwrap(), -10);
            let sum: i64 = ledger.query("t1", 100).await.unwrap().iter().map(|t| t.amount).sum();
            assert_eq!(sum, -20);
        });
    }
}
