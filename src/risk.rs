//! Heuristic fraud-likelihood scoring for outgoing transfers.
//!
//! Pure function of the wallet's recent transfer-out history; no side
//! effects, safe to call speculatively before any state changes.

use serde::Serialize;

use crate::config::RiskConfig;
use crate::types::{MinorUnits, WalletId};

pub const WEIGHT_UNUSUAL_AMOUNT: u8 = 20;
pub const WEIGHT_NEW_RECIPIENT: u8 = 15;
pub const WEIGHT_RAPID_TRANSACTIONS: u8 = 25;
pub const WEIGHT_NEW_ACCOUNT_LARGE_TRANSFER: u8 = 20;
pub const WEIGHT_NEAR_DAILY_LIMIT: u8 = 10;

const RAPID_WINDOW_MS: i64 = 10 * 60 * 1000;
const RAPID_COUNT: usize = 3;
const NEW_ACCOUNT_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;
pub const MAX_SCORE: u8 = 100;

/// Behavioral signal that contributed to a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    UnusualAmount,
    NewRecipient,
    RapidTransactions,
    NewAccountLargeTransfer,
    NearDailyLimit,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::UnusualAmount => "unusual_amount",
            RiskFlag::NewRecipient => "new_recipient",
            RiskFlag::RapidTransactions => "rapid_transactions",
            RiskFlag::NewAccountLargeTransfer => "new_account_large_transfer",
            RiskFlag::NearDailyLimit => "near_daily_limit",
        }
    }
}

impl std::fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One prior transfer-out, as seen by the scorer.
#[derive(Debug, Clone)]
pub struct TransferOutSample {
    pub recipient: Option<WalletId>,
    pub amount: MinorUnits,
    pub at_ms: i64,
}

/// Everything the scorer looks at. `history` must already be restricted to
/// the trailing 30 days of completed transfer-outs.
#[derive(Debug)]
pub struct RiskInput<'a> {
    pub amount: MinorUnits,
    pub recipient: &'a WalletId,
    pub wallet_created_at_ms: i64,
    pub now_ms: i64,
    pub remaining_daily: MinorUnits,
    pub history: &'a [TransferOutSample],
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub flags: Vec<RiskFlag>,
}

impl RiskAssessment {
    pub fn flag_names(&self) -> Vec<String> {
        self.flags.iter().map(|f| f.as_str().to_string()).collect()
    }
}

/// Score a prospective transfer. Weighted signals are summed and capped at
/// [`MAX_SCORE`].
pub fn score(input: &RiskInput<'_>, cfg: &RiskConfig) -> RiskAssessment {
    let mut total: u32 = 0;
    let mut flags = Vec::new();

    // unusual_amount: only meaningful once there is history to average over
    if !input.history.is_empty() {
        let sum: i64 = input.history.iter().map(|h| h.amount).sum();
        let avg = sum / input.history.len() as i64;
        if input.amount > 2 * avg {
            total += WEIGHT_UNUSUAL_AMOUNT as u32;
            flags.push(RiskFlag::UnusualAmount);
        }
    }

    // new_recipient: no prior transfer-out to this wallet
    let seen_before = input
        .history
        .iter()
        .any(|h| h.recipient.as_ref() == Some(input.recipient));
    if !seen_before {
        total += WEIGHT_NEW_RECIPIENT as u32;
        flags.push(RiskFlag::NewRecipient);
    }

    // rapid_transactions: 3+ transfer-outs in the trailing 10 minutes
    let recent = input
        .history
        .iter()
        .filter(|h| h.at_ms >= input.now_ms - RAPID_WINDOW_MS)
        .count();
    if recent >= RAPID_COUNT {
        total += WEIGHT_RAPID_TRANSACTIONS as u32;
        flags.push(RiskFlag::RapidTransactions);
    }

    // new_account_large_transfer: wallet younger than 7 days moving a large amount
    let age_ms = input.now_ms - input.wallet_created_at_ms;
    if age_ms < NEW_ACCOUNT_AGE_MS && input.amount > cfg.large_transfer_threshold {
        total += WEIGHT_NEW_ACCOUNT_LARGE_TRANSFER as u32;
        flags.push(RiskFlag::NewAccountLargeTransfer);
    }

    // near_daily_limit: amount above 90% of the remaining daily allowance
    if input.amount * 10 > input.remaining_daily * 9 {
        total += WEIGHT_NEAR_DAILY_LIMIT as u32;
        flags.push(RiskFlag::NearDailyLimit);
    }

    RiskAssessment {
        score: total.min(MAX_SCORE as u32) as u8,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn cfg() -> RiskConfig {
        RiskConfig::default()
    }

    fn sample(recipient: &str, amount: MinorUnits, at_ms: i64) -> TransferOutSample {
        TransferOutSample {
            recipient: Some(WalletId::from(recipient)),
            amount,
            at_ms,
        }
    }

    #[test]
    fn test_no_history_new_recipient_only() {
        let recipient = WalletId::from("W-RECIP234");
        let input = RiskInput {
            amount: 1_000,
            recipient: &recipient,
            wallet_created_at_ms: 0,
            now_ms: 30 * DAY_MS,
            remaining_daily: 50_000,
            history: &[],
        };
        let a = score(&input, &cfg());
        assert_eq!(a.score, WEIGHT_NEW_RECIPIENT);
        assert_eq!(a.flags, vec![RiskFlag::NewRecipient]);
    }

    #[test]
    fn test_unusual_amount_needs_history() {
        let recipient = WalletId::from("W-RECIP234");
        let now = 30 * DAY_MS;
        let history = vec![
            sample("W-RECIP234", 1_000, now - 5 * DAY_MS),
            sample("W-RECIP234", 1_000, now - 3 * DAY_MS),
        ];
        let input = RiskInput {
            amount: 2_001, // just over 2x the 1000 average
            recipient: &recipient,
            wallet_created_at_ms: 0,
            now_ms: now,
            remaining_daily: 50_000,
            history: &history,
        };
        let a = score(&input, &cfg());
        assert!(a.flags.contains(&RiskFlag::UnusualAmount));
        assert!(!a.flags.contains(&RiskFlag::NewRecipient));
    }

    #[test]
    fn test_rapid_transactions_window() {
        let recipient = WalletId::from("W-RECIP234");
        let now = 30 * DAY_MS;
        let history = vec![
            sample("W-RECIP234", 500, now - 60_000),
            sample("W-RECIP234", 500, now - 120_000),
            sample("W-RECIP234", 500, now - 9 * 60_000),
            // outside the 10 minute window, must not count
            sample("W-RECIP234", 500, now - 11 * 60_000),
        ];
        let input = RiskInput {
            amount: 500,
            recipient: &recipient,
            wallet_created_at_ms: 0,
            now_ms: now,
            remaining_daily: 50_000,
            history: &history,
        };
        let a = score(&input, &cfg());
        assert!(a.flags.contains(&RiskFlag::RapidTransactions));
    }

    #[test]
    fn test_young_account_large_transfer_plus_rapid() {
        // Wallet under 7 days old firing 15000-unit transfers in quick
        // succession: the 4th attempt carries both signals, total 45,
        // below the 50-point acknowledgement threshold.
        let recipient = WalletId::from("W-RECIP234");
        let created = 0;
        let now = 2 * DAY_MS;
        let history = vec![
            sample("W-RECIP234", 15_000, now - 60_000),
            sample("W-RECIP234", 15_000, now - 180_000),
            sample("W-RECIP234", 15_000, now - 300_000),
        ];
        let input = RiskInput {
            amount: 15_000,
            recipient: &recipient,
            wallet_created_at_ms: created,
            now_ms: now,
            remaining_daily: 1_000_000,
            history: &history,
        };
        let a = score(&input, &cfg());
        assert!(a.flags.contains(&RiskFlag::NewAccountLargeTransfer));
        assert!(a.flags.contains(&RiskFlag::RapidTransactions));
        assert_eq!(
            a.score,
            WEIGHT_NEW_ACCOUNT_LARGE_TRANSFER + WEIGHT_RAPID_TRANSACTIONS
        );
        assert!(a.score < 50);

        // a 5th attempt inside the same window still counts as rapid
        let mut history5 = history.clone();
        history5.push(sample("W-RECIP234", 15_000, now - 30_000));
        let input5 = RiskInput {
            history: &history5,
            ..input
        };
        let a5 = score(&input5, &cfg());
        assert!(a5.flags.contains(&RiskFlag::RapidTransactions));
    }

    #[test]
    fn test_near_daily_limit() {
        let recipient = WalletId::from("W-RECIP234");
        let history = vec![sample("W-RECIP234", 10_000, 0)];
        let input = RiskInput {
            amount: 9_500,
            recipient: &recipient,
            wallet_created_at_ms: 0,
            now_ms: 30 * DAY_MS,
            remaining_daily: 10_000, // 9500 > 90% of 10000
            history: &history,
        };
        let a = score(&input, &cfg());
        assert!(a.flags.contains(&RiskFlag::NearDailyLimit));

        let input_ok = RiskInput {
            amount: 8_900,
            ..input
        };
        let a = score(&input_ok, &cfg());
        assert!(!a.flags.contains(&RiskFlag::NearDailyLimit));
    }

    #[test]
    fn test_score_capped_at_100() {
        // All five signals firing: 20+15+25+20+10 = 90, still under the cap,
        // so construct the cap check directly off the sum logic.
        let recipient = WalletId::from("W-NEWRECIP");
        let now = DAY_MS;
        let history = vec![
            sample("W-OTHER234", 100, now - 60_000),
            sample("W-OTHER234", 100, now - 120_000),
            sample("W-OTHER234", 100, now - 180_000),
        ];
        let input = RiskInput {
            amount: 50_000,
            recipient: &recipient,
            wallet_created_at_ms: 0,
            now_ms: now,
            remaining_daily: 100,
            history: &history,
        };
        let a = score(&input, &cfg());
        assert_eq!(a.score, 90);
        assert_eq!(a.flags.len(), 5);
        assert!(a.score <= MAX_SCORE);
    }
}
