//! Application configuration, loaded from `config/{env}.yaml`.
//!
//! Every limit here is a default; wallets carry their own per-transaction
//! and daily caps which override these at creation time.

use serde::{Deserialize, Serialize};
use std::fs;

use crate::types::MinorUnits;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// PostgreSQL connection URL for the wallet store.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub pin: PinConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub rate: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "wallet-ledger.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_tracing: true,
            postgres_url: None,
            wallet: WalletConfig::default(),
            pin: PinConfig::default(),
            risk: RiskConfig::default(),
            rate: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

/// Default wallet limits, all in minor units and overridable per wallet.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletConfig {
    /// Per-transaction transfer cap ($200).
    pub per_tx_limit: MinorUnits,
    /// Daily transfer cap ($500).
    pub daily_limit: MinorUnits,
    /// Deposit bounds ($5 - $1000).
    pub deposit_min: MinorUnits,
    pub deposit_max: MinorUnits,
    /// Withdrawal bounds ($5 - $500).
    pub withdraw_min: MinorUnits,
    pub withdraw_max: MinorUnits,
    /// Fixed reference timezone for the daily counter reset, as a UTC offset
    /// in hours.
    pub daily_reset_utc_offset_hours: i32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            per_tx_limit: 20_000,
            daily_limit: 50_000,
            deposit_min: 500,
            deposit_max: 100_000,
            withdraw_min: 500,
            withdraw_max: 50_000,
            daily_reset_utc_offset_hours: 0,
        }
    }
}

/// PIN policy and Argon2id work factor.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PinConfig {
    /// Consecutive failures that trigger a lock.
    pub max_attempts: u32,
    /// Lock duration in seconds (30 minutes).
    pub lock_secs: i64,
    /// Argon2 memory cost in KiB.
    pub argon2_m_cost: u32,
    /// Argon2 iteration count.
    pub argon2_t_cost: u32,
    /// Argon2 parallelism.
    pub argon2_p_cost: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_secs: 30 * 60,
            argon2_m_cost: 19_456,
            argon2_t_cost: 2,
            argon2_p_cost: 1,
        }
    }
}

/// Risk scoring thresholds.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RiskConfig {
    /// Score at or above which the caller must set `risk_acknowledged`.
    pub ack_threshold: u8,
    /// Amount treated as "large" for young accounts ($100).
    pub large_transfer_threshold: MinorUnits,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            ack_threshold: 50,
            large_transfer_threshold: 10_000,
        }
    }
}

/// One sliding-window rate limit rule.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Default rate limits per call site.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub transfer_per_wallet: RateLimitRule,
    pub transfer_per_ip: RateLimitRule,
    pub lookup_per_ip: RateLimitRule,
    pub search_per_ip: RateLimitRule,
    pub deposit_per_wallet: RateLimitRule,
    pub withdrawal_per_wallet: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            transfer_per_wallet: RateLimitRule::new(10, 60),
            transfer_per_ip: RateLimitRule::new(20, 60),
            lookup_per_ip: RateLimitRule::new(30, 60),
            search_per_ip: RateLimitRule::new(20, 60),
            deposit_per_wallet: RateLimitRule::new(5, 3600),
            withdrawal_per_wallet: RateLimitRule::new(3, 86_400),
        }
    }
}
