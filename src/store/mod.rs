//! Wallet repository abstraction.
//!
//! The engine never talks to a database directly; it goes through
//! [`WalletStore`], which promises the atomic primitives the pipeline is
//! built on: conditional (CAS) balance debits, increment-and-read
//! counters, and a both-or-neither transfer commit that writes the balance
//! movement and the ledger pair as one unit.
//!
//! Two implementations: [`postgres::PgWalletStore`] for production and
//! [`memory::MemWalletStore`] for tests and embedded use.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::WalletError;
use crate::models::{Wallet, WalletAuditLog, WalletTransaction};
use crate::types::{MinorUnits, OwnerId, TransferId, WalletId};

/// Everything needed to commit one transfer: the conditional sender debit,
/// the recipient credit, and the linked ledger pair, atomically.
#[derive(Debug, Clone)]
pub struct TransferCommit {
    pub transfer_id: TransferId,
    pub sender_id: WalletId,
    pub sender_owner: OwnerId,
    pub sender_name: String,
    pub recipient_id: WalletId,
    pub recipient_owner: OwnerId,
    pub recipient_name: String,
    pub amount: MinorUnits,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub now_ms: i64,
}

/// The debit and credit ledger entries produced by one committed transfer.
#[derive(Debug, Clone)]
pub struct TransferPair {
    pub debit: WalletTransaction,
    pub credit: WalletTransaction,
}

/// One confirmed external payment to credit.
#[derive(Debug, Clone)]
pub struct DepositCredit {
    pub wallet_id: WalletId,
    pub amount: MinorUnits,
    pub external_ref: String,
    pub now_ms: i64,
}

/// One withdrawal request to debit.
#[derive(Debug, Clone)]
pub struct WithdrawalDebit {
    pub wallet_id: WalletId,
    pub amount: MinorUnits,
    pub description: Option<String>,
    pub now_ms: i64,
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    // === Wallets ===

    /// Insert a new wallet. Fails if the wallet id or owner already exists.
    async fn create_wallet(&self, wallet: &Wallet) -> Result<(), WalletError>;

    async fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>, WalletError>;

    async fn get_wallet_by_owner(&self, owner: OwnerId) -> Result<Option<Wallet>, WalletError>;

    /// Case-insensitive display-name prefix search.
    async fn search_wallets(
        &self,
        name_prefix: &str,
        limit: u32,
    ) -> Result<Vec<Wallet>, WalletError>;

    async fn wallet_id_exists(&self, id: &WalletId) -> Result<bool, WalletError>;

    /// Fill in missing limit fields on a legacy-schema wallet.
    async fn upgrade_legacy_wallet(
        &self,
        id: &WalletId,
        per_tx_limit: MinorUnits,
        daily_limit: MinorUnits,
    ) -> Result<(), WalletError>;

    // === PIN state ===

    async fn set_pin_hash(&self, id: &WalletId, hash: &str) -> Result<(), WalletError>;

    /// Atomically increment the failed-attempt counter, returning the new
    /// value.
    async fn increment_pin_failures(&self, id: &WalletId) -> Result<u32, WalletError>;

    async fn lock_pin(&self, id: &WalletId, until_ms: i64) -> Result<(), WalletError>;

    /// Reset to Unlocked(0): zero attempts, no lock.
    async fn clear_pin_failures(&self, id: &WalletId) -> Result<(), WalletError>;

    // === Daily counter ===

    /// Zero the daily-transferred counter and stamp the reset time.
    async fn reset_daily_window(&self, id: &WalletId, reset_at_ms: i64)
    -> Result<(), WalletError>;

    // === Ledger ===

    /// Find the debit half of a prior transfer by its caller idempotency
    /// key.
    async fn find_by_idempotency_key(
        &self,
        wallet: &WalletId,
        key: &str,
    ) -> Result<Option<WalletTransaction>, WalletError>;

    /// Find a deposit ledger entry by its external payment reference.
    async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<WalletTransaction>, WalletError>;

    /// Commit a transfer: conditionally debit the sender (only while its
    /// balance still covers the amount), credit the recipient, bump both
    /// versions and the sender's daily counter, and insert the linked
    /// debit/credit ledger pair. All of it happens atomically or not at
    /// all.
    ///
    /// Errors: `InsufficientBalance` when the conditional debit finds the
    /// funds gone, `ConcurrencyConflict` when the guarded write matched no
    /// record for another reason, `AlreadyProcessed` when the idempotency
    /// key was committed by a concurrent duplicate.
    async fn commit_transfer(&self, commit: &TransferCommit)
    -> Result<TransferPair, WalletError>;

    /// Credit a confirmed external payment. Returns the ledger entry and
    /// whether it was a replay of an already-processed reference.
    async fn credit_deposit(
        &self,
        credit: &DepositCredit,
    ) -> Result<(WalletTransaction, bool), WalletError>;

    /// Conditionally debit a withdrawal and write its ledger entry.
    async fn debit_withdrawal(
        &self,
        debit: &WithdrawalDebit,
    ) -> Result<WalletTransaction, WalletError>;

    /// Completed transfer-out entries newer than `since_ms`, for risk
    /// scoring.
    async fn recent_transfer_outs(
        &self,
        wallet: &WalletId,
        since_ms: i64,
    ) -> Result<Vec<WalletTransaction>, WalletError>;

    /// Completed credits minus completed debits over the whole ledger.
    async fn ledger_balance(&self, wallet: &WalletId) -> Result<MinorUnits, WalletError>;

    // === Audit ===

    async fn append_audit(&self, entry: &WalletAuditLog) -> Result<(), WalletError>;

    // === Rate limiting ===

    /// Find-or-create the counter for (subject, action, window_start) and
    /// increment it, returning the new count. The increment and read are
    /// one atomic step.
    async fn incr_rate_counter(
        &self,
        subject: &str,
        action: &str,
        window_start_ms: i64,
        expires_at_ms: i64,
    ) -> Result<u32, WalletError>;
}
