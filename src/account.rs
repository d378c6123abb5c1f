//! Wallet provisioning and public queries.
//!
//! `open_wallet` is idempotent per owner: a repeated open returns the
//! existing wallet, and a wallet persisted before per-wallet limits existed
//! is upgraded in place on the way out. Lookup and search expose only
//! public fields and are rate limited per caller IP.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::error::WalletError;
use crate::models::{Wallet, WalletAuditLog};
use crate::pin::PinSecurity;
use crate::rate_limit::{RateLimitAction, RateLimiter};
use crate::store::WalletStore;
use crate::types::{OwnerId, WalletId, WalletStatus};
use crate::wallet_id::WalletIdGenerator;

const SEARCH_RESULT_LIMIT: u32 = 10;

/// What a non-owner may see about a wallet.
#[derive(Debug, Clone, Serialize)]
pub struct WalletPublicInfo {
    pub wallet_id: WalletId,
    pub display_name: String,
}

impl From<&Wallet> for WalletPublicInfo {
    fn from(w: &Wallet) -> Self {
        Self {
            wallet_id: w.wallet_id.clone(),
            display_name: w.display_name.clone(),
        }
    }
}

pub struct WalletAccountService {
    store: Arc<dyn WalletStore>,
    limiter: RateLimiter,
    id_gen: WalletIdGenerator,
    pin: PinSecurity,
    cfg: AppConfig,
}

impl WalletAccountService {
    pub fn new(store: Arc<dyn WalletStore>, cfg: &AppConfig) -> Result<Self, WalletError> {
        Ok(Self {
            limiter: RateLimiter::new(store.clone()),
            store,
            id_gen: WalletIdGenerator::new(),
            pin: PinSecurity::new(&cfg.pin)?,
            cfg: cfg.clone(),
        })
    }

    /// Create the owner's wallet, or return the existing one.
    ///
    /// Repeated opens are a no-op. A wallet written before per-wallet
    /// limits existed carries zeroed caps and gets the configured defaults
    /// filled in before it is returned.
    pub async fn open_wallet(
        &self,
        owner: OwnerId,
        display_name: &str,
        now_ms: i64,
    ) -> Result<Wallet, WalletError> {
        if let Some(existing) = self.store.get_wallet_by_owner(owner).await? {
            return self.upgrade_if_legacy(existing).await;
        }

        let wallet_id = self.id_gen.generate(self.store.as_ref()).await?;
        let wallet = Wallet {
            wallet_id: wallet_id.clone(),
            owner_id: owner,
            display_name: display_name.to_string(),
            balance: 0,
            status: WalletStatus::Active,
            pin_hash: None,
            failed_pin_attempts: 0,
            pin_locked_until_ms: None,
            per_tx_limit: self.cfg.wallet.per_tx_limit,
            daily_limit: self.cfg.wallet.daily_limit,
            daily_transferred: 0,
            daily_reset_at_ms: now_ms,
            version: 1,
            created_at_ms: now_ms,
        };

        match self.store.create_wallet(&wallet).await {
            Ok(()) => {}
            Err(WalletError::AlreadyProcessed) => {
                // Lost a concurrent open for the same owner; theirs counts.
                if let Some(existing) = self.store.get_wallet_by_owner(owner).await? {
                    return self.upgrade_if_legacy(existing).await;
                }
                return Err(WalletError::ConcurrencyConflict);
            }
            Err(e) => return Err(e),
        }

        self.store
            .append_audit(&WalletAuditLog::new(wallet_id.clone(), "wallet_opened", "owner", now_ms))
            .await?;
        info!(wallet_id = %wallet_id, owner_id = owner, "wallet opened");
        Ok(wallet)
    }

    async fn upgrade_if_legacy(&self, wallet: Wallet) -> Result<Wallet, WalletError> {
        if !wallet.is_legacy() {
            return Ok(wallet);
        }
        self.store
            .upgrade_legacy_wallet(
                &wallet.wallet_id,
                self.cfg.wallet.per_tx_limit,
                self.cfg.wallet.daily_limit,
            )
            .await?;
        info!(wallet_id = %wallet.wallet_id, "legacy wallet limits upgraded");
        self.store
            .get_wallet(&wallet.wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet.wallet_id.to_string()))
    }

    /// Public wallet info by id, rate limited per caller IP.
    pub async fn lookup(
        &self,
        wallet_id: &WalletId,
        client_ip: &str,
        now_ms: i64,
    ) -> Result<WalletPublicInfo, WalletError> {
        self.limiter
            .enforce(
                &format!("ip:{client_ip}"),
                RateLimitAction::WalletLookup,
                self.cfg.rate.lookup_per_ip,
                now_ms,
            )
            .await?;
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        Ok(WalletPublicInfo::from(&wallet))
    }

    /// Display-name prefix search, rate limited per caller IP.
    pub async fn search(
        &self,
        name_prefix: &str,
        client_ip: &str,
        now_ms: i64,
    ) -> Result<Vec<WalletPublicInfo>, WalletError> {
        self.limiter
            .enforce(
                &format!("ip:{client_ip}"),
                RateLimitAction::WalletSearch,
                self.cfg.rate.search_per_ip,
                now_ms,
            )
            .await?;
        if name_prefix.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .store
            .search_wallets(name_prefix, SEARCH_RESULT_LIMIT)
            .await?;
        Ok(hits.iter().map(WalletPublicInfo::from).collect())
    }

    pub async fn set_pin(
        &self,
        wallet_id: &WalletId,
        pin: &str,
        now_ms: i64,
    ) -> Result<(), WalletError> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        self.pin
            .set_pin(self.store.as_ref(), &wallet, pin, now_ms)
            .await
    }

    pub async fn change_pin(
        &self,
        wallet_id: &WalletId,
        current_pin: &str,
        new_pin: &str,
        now_ms: i64,
    ) -> Result<(), WalletError> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        self.pin
            .change_pin(self.store.as_ref(), &wallet, current_pin, new_pin, now_ms)
            .await
    }
}
