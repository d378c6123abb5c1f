//! Withdrawal requests.
//!
//! A withdrawal debits the wallet and records a `Withdrawal` ledger row;
//! the external payout itself settles elsewhere and the row is the record
//! of the debit. The debit is the same conditional CAS guard transfers
//! use, so a concurrent drain cannot over-commit funds.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::WalletError;
use crate::models::WalletAuditLog;
use crate::pin::PinSecurity;
use crate::rate_limit::{RateLimitAction, RateLimiter};
use crate::store::{WalletStore, WithdrawalDebit};
use crate::types::{MinorUnits, WalletId};

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub wallet_id: WalletId,
    pub amount_minor_units: MinorUnits,
    pub pin: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawReceipt {
    pub transaction_id: Uuid,
    pub amount_minor_units: MinorUnits,
    pub new_balance_minor_units: MinorUnits,
    pub timestamp_ms: i64,
}

pub struct WithdrawService {
    store: Arc<dyn WalletStore>,
    limiter: RateLimiter,
    pin: PinSecurity,
    cfg: AppConfig,
}

impl WithdrawService {
    pub fn new(store: Arc<dyn WalletStore>, cfg: &AppConfig) -> Result<Self, WalletError> {
        Ok(Self {
            limiter: RateLimiter::new(store.clone()),
            pin: PinSecurity::new(&cfg.pin)?,
            store,
            cfg: cfg.clone(),
        })
    }

    pub async fn request(
        &self,
        req: &WithdrawRequest,
        now_ms: i64,
    ) -> Result<WithdrawReceipt, WalletError> {
        if req.amount_minor_units <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let (min, max) = (self.cfg.wallet.withdraw_min, self.cfg.wallet.withdraw_max);
        if !(min..=max).contains(&req.amount_minor_units) {
            return Err(WalletError::AmountOutOfBounds { min, max });
        }

        self.limiter
            .enforce(
                &format!("wallet:{}", req.wallet_id),
                RateLimitAction::Withdrawal,
                self.cfg.rate.withdrawal_per_wallet,
                now_ms,
            )
            .await?;

        let wallet = self
            .store
            .get_wallet(&req.wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(req.wallet_id.to_string()))?;
        if !wallet.is_active() {
            return Err(WalletError::InactiveWallet {
                wallet_id: wallet.wallet_id.to_string(),
                status: wallet.status.to_string(),
            });
        }

        self.pin
            .verify_with_lockout(self.store.as_ref(), &wallet, &req.pin, now_ms)
            .await?;

        if wallet.balance < req.amount_minor_units {
            return Err(WalletError::InsufficientBalance);
        }

        let entry = self
            .store
            .debit_withdrawal(&WithdrawalDebit {
                wallet_id: req.wallet_id.clone(),
                amount: req.amount_minor_units,
                description: req.description.clone(),
                now_ms,
            })
            .await?;

        self.store
            .append_audit(
                &WalletAuditLog::new(req.wallet_id.clone(), "withdrawal", "owner", now_ms)
                    .with_detail(serde_json::json!({
                        "amount": req.amount_minor_units,
                        "balance_after": entry.balance_after,
                    })),
            )
            .await?;
        info!(
            wallet_id = %req.wallet_id,
            amount = req.amount_minor_units,
            "withdrawal debited"
        );

        Ok(WithdrawReceipt {
            transaction_id: entry.transaction_id,
            amount_minor_units: entry.amount,
            new_balance_minor_units: entry.balance_after,
            timestamp_ms: now_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Wallet;
    use crate::pin::{PinHasher, test_pin_config};
    use crate::store::memory::MemWalletStore;
    use crate::types::WalletStatus;

    fn test_cfg() -> AppConfig {
        AppConfig {
            pin: test_pin_config(),
            ..AppConfig::default()
        }
    }

    async fn seed_wallet(store: &MemWalletStore, balance: MinorUnits) -> WalletId {
        let hasher = PinHasher::new(&test_pin_config()).unwrap();
        let wallet = Wallet {
            wallet_id: WalletId::from("W-A2345678"),
            owner_id: 1,
            display_name: "kai".to_string(),
            balance,
            status: WalletStatus::Active,
            pin_hash: Some(hasher.hash("1234").unwrap()),
            failed_pin_attempts: 0,
            pin_locked_until_ms: None,
            per_tx_limit: 20_000,
            daily_limit: 50_000,
            daily_transferred: 0,
            daily_reset_at_ms: 0,
            version: 1,
            created_at_ms: 0,
        };
        store.create_wallet(&wallet).await.unwrap();
        wallet.wallet_id
    }

    fn req(amount: MinorUnits, pin: &str) -> WithdrawRequest {
        WithdrawRequest {
            wallet_id: WalletId::from("W-A2345678"),
            amount_minor_units: amount,
            pin: pin.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_withdrawal_debits_and_records() {
        let store = Arc::new(MemWalletStore::new());
        let id = seed_wallet(&store, 10_000).await;
        let svc = WithdrawService::new(store.clone(), &test_cfg()).unwrap();

        let receipt = svc.request(&req(4_000, "1234"), 1_000).await.unwrap();
        assert_eq!(receipt.new_balance_minor_units, 6_000);

        let entries = store.ledger_entries(&id).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].balance_before, 10_000);
        assert_eq!(entries[0].balance_after, 6_000);
    }

    #[tokio::test]
    async fn test_wrong_pin_rejected_before_debit() {
        let store = Arc::new(MemWalletStore::new());
        let id = seed_wallet(&store, 10_000).await;
        let svc = WithdrawService::new(store.clone(), &test_cfg()).unwrap();

        let err = svc.request(&req(4_000, "9999"), 1_000).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidPin { .. }));
        assert!(store.ledger_entries(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_bounds_and_balance() {
        let store = Arc::new(MemWalletStore::new());
        seed_wallet(&store, 1_000).await;
        let svc = WithdrawService::new(store, &test_cfg()).unwrap();

        let err = svc.request(&req(100, "1234"), 0).await.unwrap_err();
        assert!(matches!(err, WalletError::AmountOutOfBounds { .. }));

        let err = svc.request(&req(900, "1234"), 0).await.unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance));
    }

    #[tokio::test]
    async fn test_daily_withdrawal_rate_limit() {
        let store = Arc::new(MemWalletStore::new());
        seed_wallet(&store, 100_000).await;
        let svc = WithdrawService::new(store, &test_cfg()).unwrap();

        for _ in 0..3 {
            svc.request(&req(1_000, "1234"), 0).await.unwrap();
        }
        let err = svc.request(&req(1_000, "1234"), 0).await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::RateLimited {
                action: RateLimitAction::Withdrawal
            }
        ));
    }
}
