//! PIN hashing, verification and the lockout state machine.
//!
//! Hashing is Argon2id with a configurable work factor; verification goes
//! through the PHC verifier, which does not leak correctness through
//! timing. The lockout state lives on the wallet record and is advanced
//! through atomic store updates:
//!
//! `Unlocked(attempts < max)` --failure--> attempts+1
//! attempts == max           --> `Locked(until = now + lock_duration)`
//! lock expiry or success    --> `Unlocked(attempts = 0)`
//!
//! While locked, every attempt fails fast with the remaining lock time and
//! does not consume an attempt. Failures and lock events are always
//! audit-logged, even though callers only see the generic error.

use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    rand_core::OsRng,
};
use argon2::{Algorithm, Argon2, Params, Version};
use tracing::{info, warn};

use crate::config::PinConfig;
use crate::error::WalletError;
use crate::models::{Wallet, WalletAuditLog};
use crate::store::WalletStore;

pub const PIN_MIN_LEN: usize = 4;
pub const PIN_MAX_LEN: usize = 6;

/// A PIN must be 4-6 numeric digits.
pub fn validate_pin_format(pin: &str) -> Result<(), WalletError> {
    let len_ok = (PIN_MIN_LEN..=PIN_MAX_LEN).contains(&pin.len());
    if !len_ok || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(WalletError::InvalidPinFormat);
    }
    Ok(())
}

/// Argon2id hasher with the configured work factor.
pub struct PinHasher {
    argon2: Argon2<'static>,
}

impl PinHasher {
    pub fn new(cfg: &PinConfig) -> Result<Self, WalletError> {
        let params = Params::new(cfg.argon2_m_cost, cfg.argon2_t_cost, cfg.argon2_p_cost, None)
            .map_err(|e| WalletError::PinHash(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, pin: &str) -> Result<String, WalletError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| WalletError::PinHash(e.to_string()))?
            .to_string())
    }

    pub fn verify(&self, pin: &str, hash: &str) -> Result<bool, WalletError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| WalletError::PinHash(e.to_string()))?;
        match self.argon2.verify_password(pin.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(WalletError::PinHash(e.to_string())),
        }
    }
}

/// PIN operations bound to the lockout policy.
pub struct PinSecurity {
    hasher: PinHasher,
    max_attempts: u32,
    lock_secs: i64,
}

impl PinSecurity {
    pub fn new(cfg: &PinConfig) -> Result<Self, WalletError> {
        Ok(Self {
            hasher: PinHasher::new(cfg)?,
            max_attempts: cfg.max_attempts,
            lock_secs: cfg.lock_secs,
        })
    }

    pub fn hasher(&self) -> &PinHasher {
        &self.hasher
    }

    /// Set the initial PIN. Fails if one already exists.
    pub async fn set_pin(
        &self,
        store: &dyn WalletStore,
        wallet: &Wallet,
        pin: &str,
        now_ms: i64,
    ) -> Result<(), WalletError> {
        validate_pin_format(pin)?;
        if wallet.pin_hash.is_some() {
            return Err(WalletError::PinAlreadySet);
        }
        let hash = self.hasher.hash(pin)?;
        store.set_pin_hash(&wallet.wallet_id, &hash).await?;
        store
            .append_audit(&WalletAuditLog::new(
                wallet.wallet_id.clone(),
                "pin_set",
                "owner",
                now_ms,
            ))
            .await?;
        info!(wallet_id = %wallet.wallet_id, "PIN set");
        Ok(())
    }

    /// Change the PIN. The current PIN must verify first, subject to the
    /// normal lockout rules.
    pub async fn change_pin(
        &self,
        store: &dyn WalletStore,
        wallet: &Wallet,
        current_pin: &str,
        new_pin: &str,
        now_ms: i64,
    ) -> Result<(), WalletError> {
        validate_pin_format(new_pin)?;
        self.verify_with_lockout(store, wallet, current_pin, now_ms)
            .await?;
        let hash = self.hasher.hash(new_pin)?;
        store.set_pin_hash(&wallet.wallet_id, &hash).await?;
        store
            .append_audit(&WalletAuditLog::new(
                wallet.wallet_id.clone(),
                "pin_changed",
                "owner",
                now_ms,
            ))
            .await?;
        info!(wallet_id = %wallet.wallet_id, "PIN changed");
        Ok(())
    }

    /// Verify a PIN against the wallet, driving the lockout state machine.
    pub async fn verify_with_lockout(
        &self,
        store: &dyn WalletStore,
        wallet: &Wallet,
        pin: &str,
        now_ms: i64,
    ) -> Result<(), WalletError> {
        let Some(hash) = wallet.pin_hash.as_deref() else {
            return Err(WalletError::PinNotSet);
        };

        if let Some(until) = wallet.pin_locked_until_ms {
            if until > now_ms {
                // Locked: fail fast, do not consume an attempt.
                store
                    .append_audit(&WalletAuditLog::new(
                        wallet.wallet_id.clone(),
                        "pin_rejected_locked",
                        "owner",
                        now_ms,
                    ))
                    .await?;
                return Err(WalletError::PinLocked {
                    remaining_seconds: (until - now_ms + 999) / 1000,
                });
            }
            // Lock expired: back to Unlocked(0) before this attempt counts.
            store.clear_pin_failures(&wallet.wallet_id).await?;
        }

        if self.hasher.verify(pin, hash)? {
            if wallet.failed_pin_attempts > 0 || wallet.pin_locked_until_ms.is_some() {
                store.clear_pin_failures(&wallet.wallet_id).await?;
            }
            return Ok(());
        }

        let attempts = store.increment_pin_failures(&wallet.wallet_id).await?;
        if attempts >= self.max_attempts {
            let until = now_ms + self.lock_secs * 1000;
            store.lock_pin(&wallet.wallet_id, until).await?;
            store
                .append_audit(
                    &WalletAuditLog::new(wallet.wallet_id.clone(), "pin_locked", "owner", now_ms)
                        .with_detail(serde_json::json!({
                            "attempts": attempts,
                            "locked_until_ms": until,
                        })),
                )
                .await?;
            warn!(wallet_id = %wallet.wallet_id, attempts, "PIN locked");
            Err(WalletError::PinLocked {
                remaining_seconds: self.lock_secs,
            })
        } else {
            store
                .append_audit(
                    &WalletAuditLog::new(wallet.wallet_id.clone(), "pin_failed", "owner", now_ms)
                        .with_detail(serde_json::json!({ "attempts": attempts })),
                )
                .await?;
            Err(WalletError::InvalidPin {
                remaining_attempts: self.max_attempts - attempts,
            })
        }
    }
}

#[cfg(test)]
pub(crate) fn test_pin_config() -> PinConfig {
    // Minimal work factor so the suite stays fast.
    PinConfig {
        argon2_m_cost: 1024,
        argon2_t_cost: 1,
        argon2_p_cost: 1,
        ..PinConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_format() {
        assert!(validate_pin_format("1234").is_ok());
        assert!(validate_pin_format("123456").is_ok());
        assert!(validate_pin_format("123").is_err());
        assert!(validate_pin_format("1234567").is_err());
        assert!(validate_pin_format("12a4").is_err());
        assert!(validate_pin_format("").is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = PinHasher::new(&test_pin_config()).unwrap();
        let hash = hasher.hash("1234").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("1234", &hash).unwrap());
        assert!(!hasher.verify("4321", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = PinHasher::new(&test_pin_config()).unwrap();
        let a = hasher.hash("1234").unwrap();
        let b = hasher.hash("1234").unwrap();
        assert_ne!(a, b);
    }
}
