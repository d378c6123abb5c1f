//! Reconciliation of cached balances against the ledger.
//!
//! The ledger is the source of truth and the wallet balance is a cache;
//! this module reports drift between the two and never corrects it.
//! Remediation is an explicit, separate operator action.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::WalletError;
use crate::store::WalletStore;
use crate::types::{MinorUnits, WalletId};

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub wallet_id: WalletId,
    /// The cached `Wallet.balance`.
    pub cached: MinorUnits,
    /// Completed ledger credits minus completed debits.
    pub derived: MinorUnits,
    /// `cached - derived`; zero when the wallet is consistent.
    pub difference: MinorUnits,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.difference == 0
    }
}

pub struct Reconciler {
    store: Arc<dyn WalletStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        wallet_id: &WalletId,
    ) -> Result<ReconciliationReport, WalletError> {
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))?;
        let derived = self.store.ledger_balance(wallet_id).await?;
        let report = ReconciliationReport {
            wallet_id: wallet_id.clone(),
            cached: wallet.balance,
            derived,
            difference: wallet.balance - derived,
        };
        if report.is_balanced() {
            info!(wallet_id = %wallet_id, balance = report.cached, "reconciliation clean");
        } else {
            warn!(
                wallet_id = %wallet_id,
                cached = report.cached,
                derived = report.derived,
                difference = report.difference,
                "reconciliation drift detected"
            );
        }
        Ok(report)
    }
}
