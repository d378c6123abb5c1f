//! Error taxonomy for the wallet ledger.
//!
//! Every failure the engine can produce is an explicit variant; nothing is
//! swallowed. Callers match on variants, operators read the Display text.

use crate::rate_limit::RateLimitAction;
use crate::risk::RiskFlag;
use crate::types::MinorUnits;

/// Which transfer limit rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PerTransaction,
    Daily,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::PerTransaction => "per_transaction",
            LimitKind::Daily => "daily",
        }
    }
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("wallet not found: {0}")]
    NotFound(String),

    #[error("wallet {wallet_id} is {status}, not active")]
    InactiveWallet { wallet_id: String, status: String },

    #[error("cannot transfer to the same wallet")]
    SelfTransfer,

    #[error("invalid PIN ({remaining_attempts} attempts remaining)")]
    InvalidPin { remaining_attempts: u32 },

    #[error("PIN locked, retry in {remaining_seconds}s")]
    PinLocked { remaining_seconds: i64 },

    #[error("no PIN set for this wallet")]
    PinNotSet,

    #[error("a PIN is already set; use change instead")]
    PinAlreadySet,

    #[error("PIN must be 4-6 numeric digits")]
    InvalidPinFormat,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("{which} limit exceeded (limiting value {limit} minor units)")]
    LimitExceeded { which: LimitKind, limit: MinorUnits },

    #[error("transfer flagged high risk (score {score}); resubmit with risk_acknowledged to proceed")]
    HighRiskUnacknowledged { score: u8, flags: Vec<RiskFlag> },

    #[error("lost a concurrent balance update; retry with the same idempotency key")]
    ConcurrencyConflict,

    #[error("already processed")]
    AlreadyProcessed,

    #[error("rate limit exceeded for {action}")]
    RateLimited { action: RateLimitAction },

    #[error("amount must be a positive number of minor units")]
    InvalidAmount,

    #[error("amount outside allowed bounds ({min}..={max} minor units)")]
    AmountOutOfBounds { min: MinorUnits, max: MinorUnits },

    #[error("PIN hashing failed: {0}")]
    PinHash(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_operator_detail() {
        let e = WalletError::InvalidPin {
            remaining_attempts: 2,
        };
        assert!(e.to_string().contains("2 attempts"));

        let e = WalletError::LimitExceeded {
            which: LimitKind::Daily,
            limit: 50_000,
        };
        assert!(e.to_string().contains("daily"));
        assert!(e.to_string().contains("50000"));
    }
}
