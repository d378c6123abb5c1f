//! The transfer engine.
//!
//! One ordered pipeline per request; every decision point fails with an
//! explicit [`WalletError`] variant and nothing is swallowed. No state
//! changes before the committed movement, so any earlier failure is
//! trivially retryable. The movement itself (conditional sender debit,
//! recipient credit, ledger pair) is a single atomic store operation; a
//! crash can therefore never leave a moved balance without its ledger
//! entries. Lost CAS races are not retried here; the caller retries with
//! the same idempotency key and the replay lookup absorbs it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{LimitKind, WalletError};
use crate::models::{Wallet, WalletAuditLog, WalletTransaction};
use crate::notify::{Notifier, TransferNotice};
use crate::pin::PinSecurity;
use crate::rate_limit::{RateLimitAction, RateLimiter};
use crate::risk::{self, RiskInput, TransferOutSample};
use crate::store::{TransferCommit, WalletStore};
use crate::types::{MinorUnits, TransferId, WalletId};

/// Risk scoring looks at the trailing 30 days of transfer-outs.
const RISK_HISTORY_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    pub amount_minor_units: MinorUnits,
    pub pin: String,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub risk_acknowledged: bool,
    /// Caller IP for the per-IP rate limit; absent for internal callers.
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientInfo {
    pub wallet_id: WalletId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: Uuid,
    pub transfer_id: TransferId,
    pub amount_minor_units: MinorUnits,
    pub new_balance_minor_units: MinorUnits,
    pub recipient: RecipientInfo,
    pub timestamp_ms: i64,
    /// True when this response replays a previously recorded outcome.
    pub idempotent_replay: bool,
}

/// Start of the calendar day containing `now_ms`, in a fixed reference
/// timezone given as a UTC offset in hours.
pub(crate) fn day_start_ms(now_ms: i64, utc_offset_hours: i32) -> i64 {
    let offset_ms = (utc_offset_hours as i64) * 60 * 60 * 1000;
    let local = now_ms + offset_ms;
    local.div_euclid(DAY_MS) * DAY_MS - offset_ms
}

pub struct TransferEngine {
    store: Arc<dyn WalletStore>,
    limiter: RateLimiter,
    pin: PinSecurity,
    notifier: Arc<dyn Notifier>,
    cfg: AppConfig,
}

impl TransferEngine {
    pub fn new(
        store: Arc<dyn WalletStore>,
        notifier: Arc<dyn Notifier>,
        cfg: &AppConfig,
    ) -> Result<Self, WalletError> {
        Ok(Self {
            limiter: RateLimiter::new(store.clone()),
            pin: PinSecurity::new(&cfg.pin)?,
            store,
            notifier,
            cfg: cfg.clone(),
        })
    }

    /// Run the full transfer pipeline for one request.
    pub async fn execute(
        &self,
        req: &TransferRequest,
        now_ms: i64,
    ) -> Result<TransferReceipt, WalletError> {
        if req.amount_minor_units <= 0 {
            return Err(WalletError::InvalidAmount);
        }

        // Rate limits come before everything else, including the replay
        // lookup, so a flood of duplicates still burns its own quota.
        self.limiter
            .enforce(
                &format!("wallet:{}", req.from_wallet_id),
                RateLimitAction::Transfer,
                self.cfg.rate.transfer_per_wallet,
                now_ms,
            )
            .await?;
        if let Some(ip) = req.client_ip.as_deref() {
            self.limiter
                .enforce(
                    &format!("ip:{ip}"),
                    RateLimitAction::Transfer,
                    self.cfg.rate.transfer_per_ip,
                    now_ms,
                )
                .await?;
        }

        // Replay lookup: a recorded outcome is returned verbatim.
        if let Some(prior) = self
            .store
            .find_by_idempotency_key(&req.from_wallet_id, &req.idempotency_key)
            .await?
        {
            info!(
                wallet_id = %req.from_wallet_id,
                idempotency_key = %req.idempotency_key,
                "idempotent transfer replay"
            );
            return Self::replay_receipt(&prior);
        }

        let sender = self.load_active(&req.from_wallet_id).await?;
        let recipient = self.load_active(&req.to_wallet_id).await?;

        if sender.wallet_id == recipient.wallet_id {
            return Err(WalletError::SelfTransfer);
        }

        self.pin
            .verify_with_lockout(self.store.as_ref(), &sender, &req.pin, now_ms)
            .await?;

        if sender.balance < req.amount_minor_units {
            return Err(WalletError::InsufficientBalance);
        }

        let sender = self.refresh_daily_window(sender, now_ms).await?;
        if req.amount_minor_units > sender.per_tx_limit {
            return Err(WalletError::LimitExceeded {
                which: LimitKind::PerTransaction,
                limit: sender.per_tx_limit,
            });
        }
        if req.amount_minor_units > sender.remaining_daily() {
            return Err(WalletError::LimitExceeded {
                which: LimitKind::Daily,
                limit: sender.daily_limit,
            });
        }

        let assessment = self.assess_risk(&sender, &recipient.wallet_id, req, now_ms).await?;
        if assessment.score >= self.cfg.risk.ack_threshold && !req.risk_acknowledged {
            warn!(
                wallet_id = %sender.wallet_id,
                score = assessment.score,
                flags = ?assessment.flags,
                "transfer held for risk acknowledgement"
            );
            return Err(WalletError::HighRiskUnacknowledged {
                score: assessment.score,
                flags: assessment.flags,
            });
        }

        let commit = TransferCommit {
            transfer_id: TransferId::new(),
            sender_id: sender.wallet_id.clone(),
            sender_owner: sender.owner_id,
            sender_name: sender.display_name.clone(),
            recipient_id: recipient.wallet_id.clone(),
            recipient_owner: recipient.owner_id,
            recipient_name: recipient.display_name.clone(),
            amount: req.amount_minor_units,
            idempotency_key: req.idempotency_key.clone(),
            description: req.description.clone(),
            now_ms,
        };
        let pair = match self.store.commit_transfer(&commit).await {
            Ok(pair) => pair,
            Err(WalletError::AlreadyProcessed) => {
                // A concurrent duplicate committed between our replay lookup
                // and the commit. Its outcome is the outcome.
                let prior = self
                    .store
                    .find_by_idempotency_key(&req.from_wallet_id, &req.idempotency_key)
                    .await?
                    .ok_or(WalletError::ConcurrencyConflict)?;
                return Self::replay_receipt(&prior);
            }
            Err(e) => return Err(e),
        };

        self.store
            .append_audit(
                &WalletAuditLog::new(sender.wallet_id.clone(), "transfer_out", "owner", now_ms)
                    .with_detail(serde_json::json!({
                        "transfer_id": commit.transfer_id.to_string(),
                        "to": recipient.wallet_id.as_str(),
                        "amount": req.amount_minor_units,
                        "balance_after": pair.debit.balance_after,
                    }))
                    .with_risk(assessment.score, assessment.flag_names()),
            )
            .await?;

        // Funds already moved; a failed notice is an operator problem, not
        // a transfer failure.
        let notice = TransferNotice {
            recipient: recipient.wallet_id.clone(),
            sender_name: sender.display_name.clone(),
            amount: req.amount_minor_units,
            transfer_id: commit.transfer_id,
        };
        if let Err(e) = self.notifier.transfer_received(&notice).await {
            warn!(
                transfer_id = %commit.transfer_id,
                error = %e,
                "recipient notification failed after commit"
            );
        }

        info!(
            transfer_id = %commit.transfer_id,
            from = %sender.wallet_id,
            to = %recipient.wallet_id,
            amount = req.amount_minor_units,
            "transfer completed"
        );

        Ok(TransferReceipt {
            transaction_id: pair.debit.transaction_id,
            transfer_id: commit.transfer_id,
            amount_minor_units: req.amount_minor_units,
            new_balance_minor_units: pair.debit.balance_after,
            recipient: RecipientInfo {
                wallet_id: recipient.wallet_id,
                name: recipient.display_name,
            },
            timestamp_ms: now_ms,
            idempotent_replay: false,
        })
    }

    async fn load_active(&self, id: &WalletId) -> Result<Wallet, WalletError> {
        let wallet = self
            .store
            .get_wallet(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        if !wallet.is_active() {
            return Err(WalletError::InactiveWallet {
                wallet_id: wallet.wallet_id.to_string(),
                status: wallet.status.to_string(),
            });
        }
        Ok(wallet)
    }

    /// Lazily reset the daily counter when the calendar day rolled over.
    /// Also fills in limits on a legacy wallet that slipped past opening.
    async fn refresh_daily_window(
        &self,
        mut wallet: Wallet,
        now_ms: i64,
    ) -> Result<Wallet, WalletError> {
        if wallet.is_legacy() {
            self.store
                .upgrade_legacy_wallet(
                    &wallet.wallet_id,
                    self.cfg.wallet.per_tx_limit,
                    self.cfg.wallet.daily_limit,
                )
                .await?;
            if wallet.per_tx_limit == 0 {
                wallet.per_tx_limit = self.cfg.wallet.per_tx_limit;
            }
            if wallet.daily_limit == 0 {
                wallet.daily_limit = self.cfg.wallet.daily_limit;
            }
        }

        let offset = self.cfg.wallet.daily_reset_utc_offset_hours;
        if day_start_ms(now_ms, offset) > day_start_ms(wallet.daily_reset_at_ms, offset) {
            self.store
                .reset_daily_window(&wallet.wallet_id, now_ms)
                .await?;
            wallet.daily_transferred = 0;
            wallet.daily_reset_at_ms = now_ms;
        }
        Ok(wallet)
    }

    async fn assess_risk(
        &self,
        sender: &Wallet,
        recipient: &WalletId,
        req: &TransferRequest,
        now_ms: i64,
    ) -> Result<risk::RiskAssessment, WalletError> {
        let history: Vec<TransferOutSample> = self
            .store
            .recent_transfer_outs(&sender.wallet_id, now_ms - RISK_HISTORY_WINDOW_MS)
            .await?
            .into_iter()
            .map(|t| TransferOutSample {
                recipient: t.counterpart_wallet_id,
                amount: t.amount,
                at_ms: t.created_at_ms,
            })
            .collect();
        Ok(risk::score(
            &RiskInput {
                amount: req.amount_minor_units,
                recipient,
                wallet_created_at_ms: sender.created_at_ms,
                now_ms,
                remaining_daily: sender.remaining_daily(),
                history: &history,
            },
            &self.cfg.risk,
        ))
    }

    fn replay_receipt(prior: &WalletTransaction) -> Result<TransferReceipt, WalletError> {
        let transfer_id = prior
            .transfer_id
            .ok_or_else(|| WalletError::Storage("transfer entry missing transfer_id".to_string()))?;
        let recipient_id = prior
            .counterpart_wallet_id
            .clone()
            .ok_or_else(|| WalletError::Storage("transfer entry missing counterpart".to_string()))?;
        Ok(TransferReceipt {
            transaction_id: prior.transaction_id,
            transfer_id,
            amount_minor_units: prior.amount,
            new_balance_minor_units: prior.balance_after,
            recipient: RecipientInfo {
                wallet_id: recipient_id,
                name: prior.counterpart_name.clone().unwrap_or_default(),
            },
            timestamp_ms: prior.created_at_ms,
            idempotent_replay: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_start_utc() {
        assert_eq!(day_start_ms(0, 0), 0);
        assert_eq!(day_start_ms(DAY_MS - 1, 0), 0);
        assert_eq!(day_start_ms(DAY_MS, 0), DAY_MS);
        assert_eq!(day_start_ms(DAY_MS + 5, 0), DAY_MS);
    }

    #[test]
    fn test_day_start_with_offset() {
        // At UTC+2, the local day rolls at 22:00 UTC.
        let offset = 2;
        let rollover = DAY_MS - 2 * 60 * 60 * 1000;
        assert_eq!(day_start_ms(rollover - 1, offset), rollover - DAY_MS);
        assert_eq!(day_start_ms(rollover, offset), rollover);
        assert_eq!(day_start_ms(rollover + 1, offset), rollover);
    }
}
