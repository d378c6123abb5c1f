//! In-memory wallet store.
//!
//! A single mutex around all state gives every trait operation the same
//! atomicity the PostgreSQL store gets from CAS updates and transactions.
//! Used by the test suite and for embedded/demo runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DepositCredit, TransferCommit, TransferPair, WalletStore, WithdrawalDebit};
use crate::error::WalletError;
use crate::models::{RateLimitCounter, Wallet, WalletAuditLog, WalletTransaction};
use crate::types::{MinorUnits, OwnerId, TxDirection, TxStatus, TxType, WalletId};

#[derive(Default)]
struct MemInner {
    wallets: HashMap<String, Wallet>,
    owner_index: HashMap<OwnerId, String>,
    ledger: Vec<WalletTransaction>,
    /// (wallet_id, idempotency_key) -> debit transaction id
    idem_index: HashMap<(String, String), Uuid>,
    external_ref_index: HashMap<String, Uuid>,
    audits: Vec<WalletAuditLog>,
    counters: HashMap<(String, String, i64), RateLimitCounter>,
}

impl MemInner {
    fn tx_by_id(&self, id: Uuid) -> Option<&WalletTransaction> {
        self.ledger.iter().find(|t| t.transaction_id == id)
    }
}

#[derive(Default)]
pub struct MemWalletStore {
    inner: Mutex<MemInner>,
}

impl MemWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: mutate a wallet record in place (limits, status, PIN
    /// lock timestamps). Returns false if the wallet does not exist.
    pub async fn with_wallet_mut(&self, id: &WalletId, f: impl FnOnce(&mut Wallet)) -> bool {
        let mut g = self.inner.lock().await;
        match g.wallets.get_mut(id.as_str()) {
            Some(w) => {
                f(w);
                true
            }
            None => false,
        }
    }

    /// Test hook: all audit entries for a wallet, in append order.
    pub async fn audit_entries(&self, id: &WalletId) -> Vec<WalletAuditLog> {
        let g = self.inner.lock().await;
        g.audits
            .iter()
            .filter(|a| &a.wallet_id == id)
            .cloned()
            .collect()
    }

    /// Test hook: all ledger entries for a wallet, in append order.
    pub async fn ledger_entries(&self, id: &WalletId) -> Vec<WalletTransaction> {
        let g = self.inner.lock().await;
        g.ledger
            .iter()
            .filter(|t| &t.wallet_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WalletStore for MemWalletStore {
    async fn create_wallet(&self, wallet: &Wallet) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        if g.wallets.contains_key(wallet.wallet_id.as_str())
            || g.owner_index.contains_key(&wallet.owner_id)
        {
            return Err(WalletError::AlreadyProcessed);
        }
        g.owner_index
            .insert(wallet.owner_id, wallet.wallet_id.as_str().to_string());
        g.wallets
            .insert(wallet.wallet_id.as_str().to_string(), wallet.clone());
        Ok(())
    }

    async fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>, WalletError> {
        let g = self.inner.lock().await;
        Ok(g.wallets.get(id.as_str()).cloned())
    }

    async fn get_wallet_by_owner(&self, owner: OwnerId) -> Result<Option<Wallet>, WalletError> {
        let g = self.inner.lock().await;
        Ok(g.owner_index
            .get(&owner)
            .and_then(|id| g.wallets.get(id))
            .cloned())
    }

    async fn search_wallets(
        &self,
        name_prefix: &str,
        limit: u32,
    ) -> Result<Vec<Wallet>, WalletError> {
        let g = self.inner.lock().await;
        let needle = name_prefix.to_lowercase();
        let mut hits: Vec<Wallet> = g
            .wallets
            .values()
            .filter(|w| w.display_name.to_lowercase().starts_with(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn wallet_id_exists(&self, id: &WalletId) -> Result<bool, WalletError> {
        let g = self.inner.lock().await;
        Ok(g.wallets.contains_key(id.as_str()))
    }

    async fn upgrade_legacy_wallet(
        &self,
        id: &WalletId,
        per_tx_limit: MinorUnits,
        daily_limit: MinorUnits,
    ) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        let w = g
            .wallets
            .get_mut(id.as_str())
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        if w.per_tx_limit == 0 {
            w.per_tx_limit = per_tx_limit;
        }
        if w.daily_limit == 0 {
            w.daily_limit = daily_limit;
        }
        Ok(())
    }

    async fn set_pin_hash(&self, id: &WalletId, hash: &str) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        let w = g
            .wallets
            .get_mut(id.as_str())
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        w.pin_hash = Some(hash.to_string());
        w.failed_pin_attempts = 0;
        w.pin_locked_until_ms = None;
        Ok(())
    }

    async fn increment_pin_failures(&self, id: &WalletId) -> Result<u32, WalletError> {
        let mut g = self.inner.lock().await;
        let w = g
            .wallets
            .get_mut(id.as_str())
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        w.failed_pin_attempts += 1;
        Ok(w.failed_pin_attempts)
    }

    async fn lock_pin(&self, id: &WalletId, until_ms: i64) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        let w = g
            .wallets
            .get_mut(id.as_str())
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        w.pin_locked_until_ms = Some(until_ms);
        Ok(())
    }

    async fn clear_pin_failures(&self, id: &WalletId) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        let w = g
            .wallets
            .get_mut(id.as_str())
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        w.failed_pin_attempts = 0;
        w.pin_locked_until_ms = None;
        Ok(())
    }

    async fn reset_daily_window(
        &self,
        id: &WalletId,
        reset_at_ms: i64,
    ) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        let w = g
            .wallets
            .get_mut(id.as_str())
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        w.daily_transferred = 0;
        w.daily_reset_at_ms = reset_at_ms;
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        wallet: &WalletId,
        key: &str,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        let g = self.inner.lock().await;
        let id = g
            .idem_index
            .get(&(wallet.as_str().to_string(), key.to_string()))
            .copied();
        Ok(id.and_then(|id| g.tx_by_id(id)).cloned())
    }

    async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        let g = self.inner.lock().await;
        let id = g.external_ref_index.get(external_ref).copied();
        Ok(id.and_then(|id| g.tx_by_id(id)).cloned())
    }

    async fn commit_transfer(
        &self,
        commit: &TransferCommit,
    ) -> Result<TransferPair, WalletError> {
        let mut g = self.inner.lock().await;

        let idem_key = (
            commit.sender_id.as_str().to_string(),
            commit.idempotency_key.clone(),
        );
        if g.idem_index.contains_key(&idem_key) {
            return Err(WalletError::AlreadyProcessed);
        }

        // Conditional sender debit: the guard re-checks the balance at the
        // moment of write, so a concurrent winner makes this attempt fail
        // cleanly instead of over-committing funds.
        let (sender_before, sender_after) = {
            let sender = g
                .wallets
                .get_mut(commit.sender_id.as_str())
                .ok_or_else(|| WalletError::NotFound(commit.sender_id.to_string()))?;
            if !sender.is_active() {
                return Err(WalletError::InactiveWallet {
                    wallet_id: sender.wallet_id.to_string(),
                    status: sender.status.to_string(),
                });
            }
            if sender.balance < commit.amount {
                return Err(WalletError::InsufficientBalance);
            }
            let before = sender.balance;
            sender.balance -= commit.amount;
            sender.daily_transferred += commit.amount;
            sender.version += 1;
            (before, sender.balance)
        };

        // Credits are unconditional and always safe.
        let (recipient_before, recipient_after) = {
            let recipient = g
                .wallets
                .get_mut(commit.recipient_id.as_str())
                .ok_or_else(|| WalletError::NotFound(commit.recipient_id.to_string()))?;
            let before = recipient.balance;
            recipient.balance += commit.amount;
            recipient.version += 1;
            (before, recipient.balance)
        };

        let debit = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: commit.sender_id.clone(),
            owner_id: commit.sender_owner,
            tx_type: TxType::TransferOut,
            direction: TxDirection::Debit,
            amount: commit.amount,
            balance_before: sender_before,
            balance_after: sender_after,
            transfer_id: Some(commit.transfer_id),
            counterpart_wallet_id: Some(commit.recipient_id.clone()),
            counterpart_owner_id: Some(commit.recipient_owner),
            counterpart_name: Some(commit.recipient_name.clone()),
            external_ref: None,
            idempotency_key: Some(commit.idempotency_key.clone()),
            description: commit.description.clone(),
            status: TxStatus::Completed,
            created_at_ms: commit.now_ms,
        };
        let credit = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: commit.recipient_id.clone(),
            owner_id: commit.recipient_owner,
            tx_type: TxType::TransferIn,
            direction: TxDirection::Credit,
            amount: commit.amount,
            balance_before: recipient_before,
            balance_after: recipient_after,
            transfer_id: Some(commit.transfer_id),
            counterpart_wallet_id: Some(commit.sender_id.clone()),
            counterpart_owner_id: Some(commit.sender_owner),
            counterpart_name: Some(commit.sender_name.clone()),
            external_ref: None,
            idempotency_key: Some(commit.idempotency_key.clone()),
            description: commit.description.clone(),
            status: TxStatus::Completed,
            created_at_ms: commit.now_ms,
        };

        g.idem_index.insert(idem_key, debit.transaction_id);
        g.ledger.push(debit.clone());
        g.ledger.push(credit.clone());

        Ok(TransferPair { debit, credit })
    }

    async fn credit_deposit(
        &self,
        credit: &DepositCredit,
    ) -> Result<(WalletTransaction, bool), WalletError> {
        let mut g = self.inner.lock().await;

        if let Some(id) = g.external_ref_index.get(&credit.external_ref).copied() {
            let existing = g
                .tx_by_id(id)
                .cloned()
                .ok_or_else(|| WalletError::Storage("dangling external ref index".to_string()))?;
            return Ok((existing, true));
        }

        let (owner_id, before, after) = {
            let w = g
                .wallets
                .get_mut(credit.wallet_id.as_str())
                .ok_or_else(|| WalletError::NotFound(credit.wallet_id.to_string()))?;
            let before = w.balance;
            w.balance += credit.amount;
            w.version += 1;
            (w.owner_id, before, w.balance)
        };

        let tx = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: credit.wallet_id.clone(),
            owner_id,
            tx_type: TxType::Deposit,
            direction: TxDirection::Credit,
            amount: credit.amount,
            balance_before: before,
            balance_after: after,
            transfer_id: None,
            counterpart_wallet_id: None,
            counterpart_owner_id: None,
            counterpart_name: None,
            external_ref: Some(credit.external_ref.clone()),
            idempotency_key: None,
            description: None,
            status: TxStatus::Completed,
            created_at_ms: credit.now_ms,
        };
        g.external_ref_index
            .insert(credit.external_ref.clone(), tx.transaction_id);
        g.ledger.push(tx.clone());
        Ok((tx, false))
    }

    async fn debit_withdrawal(
        &self,
        debit: &WithdrawalDebit,
    ) -> Result<WalletTransaction, WalletError> {
        let mut g = self.inner.lock().await;

        let (owner_id, before, after) = {
            let w = g
                .wallets
                .get_mut(debit.wallet_id.as_str())
                .ok_or_else(|| WalletError::NotFound(debit.wallet_id.to_string()))?;
            if w.balance < debit.amount {
                return Err(WalletError::InsufficientBalance);
            }
            let before = w.balance;
            w.balance -= debit.amount;
            w.version += 1;
            (w.owner_id, before, w.balance)
        };

        let tx = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: debit.wallet_id.clone(),
            owner_id,
            tx_type: TxType::Withdrawal,
            direction: TxDirection::Debit,
            amount: debit.amount,
            balance_before: before,
            balance_after: after,
            transfer_id: None,
            counterpart_wallet_id: None,
            counterpart_owner_id: None,
            counterpart_name: None,
            external_ref: None,
            idempotency_key: None,
            description: debit.description.clone(),
            status: TxStatus::Completed,
            created_at_ms: debit.now_ms,
        };
        g.ledger.push(tx.clone());
        Ok(tx)
    }

    async fn recent_transfer_outs(
        &self,
        wallet: &WalletId,
        since_ms: i64,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        let g = self.inner.lock().await;
        Ok(g.ledger
            .iter()
            .filter(|t| {
                &t.wallet_id == wallet
                    && t.tx_type == TxType::TransferOut
                    && t.status == TxStatus::Completed
                    && t.created_at_ms >= since_ms
            })
            .cloned()
            .collect())
    }

    async fn ledger_balance(&self, wallet: &WalletId) -> Result<MinorUnits, WalletError> {
        let g = self.inner.lock().await;
        Ok(g.ledger
            .iter()
            .filter(|t| &t.wallet_id == wallet && t.status == TxStatus::Completed)
            .map(|t| match t.direction {
                TxDirection::Credit => t.amount,
                TxDirection::Debit => -t.amount,
            })
            .sum())
    }

    async fn append_audit(&self, entry: &WalletAuditLog) -> Result<(), WalletError> {
        let mut g = self.inner.lock().await;
        g.audits.push(entry.clone());
        Ok(())
    }

    async fn incr_rate_counter(
        &self,
        subject: &str,
        action: &str,
        window_start_ms: i64,
        expires_at_ms: i64,
    ) -> Result<u32, WalletError> {
        let mut g = self.inner.lock().await;
        // Drop counters whose window closed before this one opened.
        g.counters.retain(|_, c| c.expires_at_ms > window_start_ms);

        let counter = g
            .counters
            .entry((subject.to_string(), action.to_string(), window_start_ms))
            .or_insert_with(|| RateLimitCounter {
                subject: subject.to_string(),
                action: action.to_string(),
                window_start_ms,
                count: 0,
                expires_at_ms,
            });
        counter.count += 1;
        Ok(counter.count)
    }
}
