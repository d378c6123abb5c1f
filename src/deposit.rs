//! Deposit crediting.
//!
//! Invoked only by a confirmed external payment-completion event, never by
//! an end user. Idempotency hangs off the payment provider's reference,
//! not a caller-supplied key: a replayed reference returns the recorded
//! ledger entry unchanged, and the race between two near-simultaneous
//! webhook deliveries resolves to the same answer.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::WalletError;
use crate::models::WalletAuditLog;
use crate::rate_limit::{RateLimitAction, RateLimiter};
use crate::store::{DepositCredit, WalletStore};
use crate::types::{MinorUnits, WalletId};

/// Payment-completed webhook payload.
#[derive(Debug, Clone)]
pub struct DepositNotice {
    pub wallet_id: WalletId,
    pub amount_minor_units: MinorUnits,
    pub external_payment_reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub transaction_id: Uuid,
    pub amount_minor_units: MinorUnits,
    pub new_balance_minor_units: MinorUnits,
    /// True when this reference was already credited.
    pub replayed: bool,
}

pub struct DepositService {
    store: Arc<dyn WalletStore>,
    limiter: RateLimiter,
    cfg: AppConfig,
}

impl DepositService {
    pub fn new(store: Arc<dyn WalletStore>, cfg: &AppConfig) -> Self {
        Self {
            limiter: RateLimiter::new(store.clone()),
            store,
            cfg: cfg.clone(),
        }
    }

    pub async fn credit(
        &self,
        notice: &DepositNotice,
        now_ms: i64,
    ) -> Result<DepositReceipt, WalletError> {
        if notice.amount_minor_units <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let (min, max) = (self.cfg.wallet.deposit_min, self.cfg.wallet.deposit_max);
        if !(min..=max).contains(&notice.amount_minor_units) {
            return Err(WalletError::AmountOutOfBounds { min, max });
        }

        self.limiter
            .enforce(
                &format!("wallet:{}", notice.wallet_id),
                RateLimitAction::Deposit,
                self.cfg.rate.deposit_per_wallet,
                now_ms,
            )
            .await?;

        let (entry, replayed) = self
            .store
            .credit_deposit(&DepositCredit {
                wallet_id: notice.wallet_id.clone(),
                amount: notice.amount_minor_units,
                external_ref: notice.external_payment_reference.clone(),
                now_ms,
            })
            .await?;

        if replayed {
            info!(
                wallet_id = %notice.wallet_id,
                external_ref = %notice.external_payment_reference,
                "deposit reference already credited, replaying"
            );
        } else {
            self.store
                .append_audit(
                    &WalletAuditLog::new(notice.wallet_id.clone(), "deposit_credited", "system", now_ms)
                        .with_detail(serde_json::json!({
                            "amount": notice.amount_minor_units,
                            "external_ref": notice.external_payment_reference,
                            "balance_after": entry.balance_after,
                        })),
                )
                .await?;
            info!(
                wallet_id = %notice.wallet_id,
                amount = notice.amount_minor_units,
                external_ref = %notice.external_payment_reference,
                "deposit credited"
            );
        }

        Ok(DepositReceipt {
            transaction_id: entry.transaction_id,
            amount_minor_units: entry.amount,
            new_balance_minor_units: entry.balance_after,
            replayed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Wallet;
    use crate::store::memory::MemWalletStore;
    use crate::types::WalletStatus;

    fn wallet(id: &str, owner: i64) -> Wallet {
        Wallet {
            wallet_id: WalletId::from(id),
            owner_id: owner,
            display_name: format!("owner-{owner}"),
            balance: 0,
            status: WalletStatus::Active,
            pin_hash: None,
            failed_pin_attempts: 0,
            pin_locked_until_ms: None,
            per_tx_limit: 20_000,
            daily_limit: 50_000,
            daily_transferred: 0,
            daily_reset_at_ms: 0,
            version: 1,
            created_at_ms: 0,
        }
    }

    fn notice(id: &str, amount: MinorUnits, external_ref: &str) -> DepositNotice {
        DepositNotice {
            wallet_id: WalletId::from(id),
            amount_minor_units: amount,
            external_payment_reference: external_ref.to_string(),
        }
    }

    #[tokio::test]
    async fn test_credit_and_replay() {
        let store = Arc::new(MemWalletStore::new());
        store.create_wallet(&wallet("W-A2345678", 1)).await.unwrap();
        let svc = DepositService::new(store.clone(), &AppConfig::default());

        let first = svc.credit(&notice("W-A2345678", 2_500, "pay_1"), 0).await.unwrap();
        assert!(!first.replayed);
        assert_eq!(first.new_balance_minor_units, 2_500);

        let second = svc.credit(&notice("W-A2345678", 2_500, "pay_1"), 10).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.transaction_id, first.transaction_id);

        // one credit, one audit entry
        let w = store.get_wallet(&WalletId::from("W-A2345678")).await.unwrap().unwrap();
        assert_eq!(w.balance, 2_500);
        assert_eq!(store.audit_entries(&WalletId::from("W-A2345678")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_bounds_enforced() {
        let store = Arc::new(MemWalletStore::new());
        store.create_wallet(&wallet("W-A2345678", 1)).await.unwrap();
        let svc = DepositService::new(store, &AppConfig::default());

        let err = svc.credit(&notice("W-A2345678", 499, "p1"), 0).await.unwrap_err();
        assert!(matches!(err, WalletError::AmountOutOfBounds { min: 500, .. }));

        let err = svc.credit(&notice("W-A2345678", 100_001, "p2"), 0).await.unwrap_err();
        assert!(matches!(err, WalletError::AmountOutOfBounds { max: 100_000, .. }));

        let err = svc.credit(&notice("W-A2345678", 0, "p3"), 0).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_per_wallet_rate_limit() {
        let store = Arc::new(MemWalletStore::new());
        store.create_wallet(&wallet("W-A2345678", 1)).await.unwrap();
        let svc = DepositService::new(store, &AppConfig::default());

        // 5/hour per wallet
        for i in 0..5 {
            svc.credit(&notice("W-A2345678", 1_000, &format!("p{i}")), 0)
                .await
                .unwrap();
        }
        let err = svc
            .credit(&notice("W-A2345678", 1_000, "p5"), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::RateLimited {
                action: RateLimitAction::Deposit
            }
        ));
    }
}
