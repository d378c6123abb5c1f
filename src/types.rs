//! Core type definitions for the wallet ledger.
//!
//! All monetary values are integer minor units (cents). Floating point is
//! never used for money.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Integer minor currency units (e.g. cents).
pub type MinorUnits = i64;

/// Current UTC time as epoch milliseconds, the unit every persisted
/// instant uses. Services take `now_ms` as a parameter; call this at the
/// boundary.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Owner (user) identifier from the surrounding system.
pub type OwnerId = i64;

/// Human-shareable wallet account identifier.
///
/// Produced by [`crate::wallet_id::WalletIdGenerator`]; treated as opaque
/// everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WalletId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WalletId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transfer identifier shared by the debit and credit ledger entries of one
/// transfer.
///
/// ULID-based: monotonic, sortable, and needs no coordination between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId.
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for TransferId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TransferId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Wallet lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active = 1,
    Suspended = 2,
    Frozen = 3,
}

impl WalletStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(WalletStatus::Active),
            2 => Some(WalletStatus::Suspended),
            3 => Some(WalletStatus::Frozen),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Active => "active",
            WalletStatus::Suspended => "suspended",
            WalletStatus::Frozen => "frozen",
        }
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Deposit = 1,
    TransferOut = 2,
    TransferIn = 3,
    Withdrawal = 4,
}

impl TxType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TxType::Deposit),
            2 => Some(TxType::TransferOut),
            3 => Some(TxType::TransferIn),
            4 => Some(TxType::Withdrawal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Deposit => "deposit",
            TxType::TransferOut => "transfer_out",
            TxType::TransferIn => "transfer_in",
            TxType::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a ledger entry adds to or subtracts from the wallet balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Credit = 1,
    Debit = 2,
}

impl TxDirection {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TxDirection::Credit),
            2 => Some(TxDirection::Debit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxDirection::Credit => "credit",
            TxDirection::Debit => "debit",
        }
    }
}

impl fmt::Display for TxDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger entry status. Only `Completed` entries count toward the derived
/// balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Completed = 1,
    Pending = 2,
    Failed = 3,
}

impl TxStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TxStatus::Completed),
            2 => Some(TxStatus::Pending),
            3 => Some(TxStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Completed => "completed",
            TxStatus::Pending => "pending",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_unique_and_parse() {
        let id1 = TransferId::new();
        let id2 = TransferId::new();
        assert_ne!(id1, id2);

        let parsed: TransferId = id1.to_string().parse().unwrap();
        assert_eq!(parsed, id1);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            WalletStatus::Active,
            WalletStatus::Suspended,
            WalletStatus::Frozen,
        ] {
            assert_eq!(WalletStatus::from_id(s.id()), Some(s));
        }
        assert_eq!(WalletStatus::from_id(0), None);
    }

    #[test]
    fn test_tx_type_roundtrip() {
        for t in [
            TxType::Deposit,
            TxType::TransferOut,
            TxType::TransferIn,
            TxType::Withdrawal,
        ] {
            assert_eq!(TxType::from_id(t.id()), Some(t));
        }
        assert_eq!(TxType::from_id(9), None);
        assert_eq!(TxType::TransferOut.as_str(), "transfer_out");
    }
}
