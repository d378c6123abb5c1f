//! Generic sliding-window rate limiter.
//!
//! Counters live in the store keyed by (subject, action, window start); the
//! increment-and-read happens as one atomic store operation so concurrent
//! callers cannot all slip under the limit. Distinct (subject, action)
//! pairs are fully independent, so the same logical operation can carry
//! both a per-IP and a per-wallet limit.

use std::sync::Arc;

use tracing::warn;

use crate::config::RateLimitRule;
use crate::error::WalletError;
use crate::store::WalletStore;

/// Rate-limited operation, one variant per user-facing call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    Transfer,
    WalletLookup,
    WalletSearch,
    Deposit,
    Withdrawal,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::Transfer => "transfer",
            RateLimitAction::WalletLookup => "wallet_lookup",
            RateLimitAction::WalletSearch => "wallet_search",
            RateLimitAction::Deposit => "deposit",
            RateLimitAction::Withdrawal => "withdrawal",
        }
    }
}

impl std::fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct RateLimiter {
    store: Arc<dyn WalletStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Count this hit and report whether it is within the limit.
    pub async fn check(
        &self,
        subject: &str,
        action: RateLimitAction,
        rule: RateLimitRule,
        now_ms: i64,
    ) -> Result<bool, WalletError> {
        let window_ms = (rule.window_secs as i64) * 1000;
        let window_start = now_ms - now_ms.rem_euclid(window_ms);
        let count = self
            .store
            .incr_rate_counter(subject, action.as_str(), window_start, window_start + window_ms)
            .await?;
        Ok(count <= rule.limit)
    }

    /// Like [`check`](Self::check) but returns `RateLimited` when denied.
    pub async fn enforce(
        &self,
        subject: &str,
        action: RateLimitAction,
        rule: RateLimitRule,
        now_ms: i64,
    ) -> Result<(), WalletError> {
        if self.check(subject, action, rule, now_ms).await? {
            Ok(())
        } else {
            warn!(subject, action = %action, "rate limit exceeded");
            Err(WalletError::RateLimited { action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemWalletStore;

    #[tokio::test]
    async fn test_limit_enforced_within_window() {
        let store = Arc::new(MemWalletStore::new());
        let limiter = RateLimiter::new(store);
        let rule = RateLimitRule::new(3, 60);
        let now = 1_000_000;

        for _ in 0..3 {
            assert!(limiter
                .check("ip:10.0.0.1", RateLimitAction::Transfer, rule, now)
                .await
                .unwrap());
        }
        assert!(!limiter
            .check("ip:10.0.0.1", RateLimitAction::Transfer, rule, now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_window_rollover_resets() {
        let store = Arc::new(MemWalletStore::new());
        let limiter = RateLimiter::new(store);
        let rule = RateLimitRule::new(1, 60);

        assert!(limiter
            .check("w:W-A", RateLimitAction::Withdrawal, rule, 10_000)
            .await
            .unwrap());
        assert!(!limiter
            .check("w:W-A", RateLimitAction::Withdrawal, rule, 20_000)
            .await
            .unwrap());
        // next window
        assert!(limiter
            .check("w:W-A", RateLimitAction::Withdrawal, rule, 70_000)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_actions_and_subjects_independent() {
        let store = Arc::new(MemWalletStore::new());
        let limiter = RateLimiter::new(store);
        let rule = RateLimitRule::new(1, 60);
        let now = 0;

        assert!(limiter
            .check("ip:a", RateLimitAction::Transfer, rule, now)
            .await
            .unwrap());
        // same subject, different action
        assert!(limiter
            .check("ip:a", RateLimitAction::WalletLookup, rule, now)
            .await
            .unwrap());
        // same action, different subject
        assert!(limiter
            .check("ip:b", RateLimitAction::Transfer, rule, now)
            .await
            .unwrap());
        // original pair is now exhausted
        assert!(!limiter
            .check("ip:a", RateLimitAction::Transfer, rule, now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_enforce_returns_typed_error() {
        let store = Arc::new(MemWalletStore::new());
        let limiter = RateLimiter::new(store);
        let rule = RateLimitRule::new(0, 60);

        let err = limiter
            .enforce("ip:a", RateLimitAction::WalletSearch, rule, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::RateLimited {
                action: RateLimitAction::WalletSearch
            }
        ));
    }
}
