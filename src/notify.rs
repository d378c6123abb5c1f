//! Recipient notification seam.
//!
//! Delivery transport (push, email, whatever) is an external collaborator
//! behind the [`Notifier`] trait. Notification happens after the transfer
//! commit, so failures here are logged and never surfaced as transfer
//! failures.

use async_trait::async_trait;
use tracing::info;

use crate::error::WalletError;
use crate::types::{MinorUnits, TransferId, WalletId};

/// "You received money" notice for the credited wallet.
#[derive(Debug, Clone)]
pub struct TransferNotice {
    pub recipient: WalletId,
    pub sender_name: String,
    pub amount: MinorUnits,
    pub transfer_id: TransferId,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn transfer_received(&self, notice: &TransferNotice) -> Result<(), WalletError>;
}

/// Default notifier: writes the notice to the log and nothing else.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn transfer_received(&self, notice: &TransferNotice) -> Result<(), WalletError> {
        info!(
            recipient = %notice.recipient,
            sender = %notice.sender_name,
            amount = notice.amount,
            transfer_id = %notice.transfer_id,
            "transfer received"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts deliveries and optionally fails every one of them.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub delivered: AtomicUsize,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                delivered: AtomicUsize::new(0),
                fail: true,
            }
        }

        pub fn count(&self) -> usize {
            self.delivered.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn transfer_received(&self, _notice: &TransferNotice) -> Result<(), WalletError> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WalletError::Storage("notifier transport down".to_string()));
            }
            Ok(())
        }
    }
}
