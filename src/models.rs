//! Persistent record types: Wallet, WalletTransaction (ledger),
//! WalletAuditLog, RateLimitCounter.
//!
//! `WalletTransaction` rows are immutable once written; the ledger is the
//! source of truth and `Wallet.balance` is a cache derived from it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    MinorUnits, OwnerId, TransferId, TxDirection, TxStatus, TxType, WalletId, WalletStatus,
};

/// Wallet identity plus cached financial state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub owner_id: OwnerId,
    /// Display name shown to transfer counterparts.
    pub display_name: String,
    /// Cached balance in minor units. Authoritative value is the ledger sum.
    pub balance: MinorUnits,
    pub status: WalletStatus,

    pub pin_hash: Option<String>,
    pub failed_pin_attempts: u32,
    /// Epoch millis until which PIN verification is locked out.
    pub pin_locked_until_ms: Option<i64>,

    /// Per-transaction transfer cap (minor units).
    pub per_tx_limit: MinorUnits,
    /// Daily transfer cap (minor units).
    pub daily_limit: MinorUnits,
    /// Amount transferred out since the last daily reset.
    pub daily_transferred: MinorUnits,
    /// Epoch millis of the last daily counter reset.
    pub daily_reset_at_ms: i64,

    /// Optimistic concurrency counter, bumped on every balance mutation.
    pub version: i64,
    pub created_at_ms: i64,
}

impl Wallet {
    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    /// Remaining daily transfer allowance, never negative.
    pub fn remaining_daily(&self) -> MinorUnits {
        (self.daily_limit - self.daily_transferred).max(0)
    }

    /// Wallets created before limits existed carry zeroed caps; they are
    /// upgraded in place on the next open.
    pub fn is_legacy(&self) -> bool {
        self.per_tx_limit == 0 || self.daily_limit == 0
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub transaction_id: Uuid,
    pub wallet_id: WalletId,
    pub owner_id: OwnerId,
    pub tx_type: TxType,
    pub direction: TxDirection,
    /// Always positive; `direction` carries the sign.
    pub amount: MinorUnits,
    pub balance_before: MinorUnits,
    pub balance_after: MinorUnits,
    /// Shared by the debit and credit halves of a transfer pair.
    pub transfer_id: Option<TransferId>,
    pub counterpart_wallet_id: Option<WalletId>,
    pub counterpart_owner_id: Option<OwnerId>,
    pub counterpart_name: Option<String>,
    /// Unique per deposit; prevents double-crediting a payment event.
    pub external_ref: Option<String>,
    /// Caller-supplied idempotency key, unique per sender wallet.
    pub idempotency_key: Option<String>,
    pub description: Option<String>,
    pub status: TxStatus,
    pub created_at_ms: i64,
}

/// Append-only compliance trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAuditLog {
    pub id: Uuid,
    pub wallet_id: WalletId,
    pub action: String,
    /// Before/after values and operation-specific context.
    pub detail: serde_json::Value,
    pub risk_score: Option<u8>,
    pub risk_flags: Vec<String>,
    pub actor: String,
    pub created_at_ms: i64,
}

impl WalletAuditLog {
    pub fn new(wallet_id: WalletId, action: &str, actor: &str, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            action: action.to_string(),
            detail: serde_json::Value::Null,
            risk_score: None,
            risk_flags: Vec::new(),
            actor: actor.to_string(),
            created_at_ms: now_ms,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_risk(mut self, score: u8, flags: Vec<String>) -> Self {
        self.risk_score = Some(score);
        self.risk_flags = flags;
        self
    }
}

/// Ephemeral sliding-window counter used by the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitCounter {
    pub subject: String,
    pub action: String,
    pub window_start_ms: i64,
    pub count: u32,
    pub expires_at_ms: i64,
}
