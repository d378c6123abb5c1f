//! wallet-ledger - Internal wallet and transfer engine
//!
//! Moves small balances between user wallets with an idempotent,
//! concurrency-safe pipeline over an append-only ledger.
//!
//! # Modules
//!
//! - [`types`] - Core identifiers and enums (WalletId, TransferId, etc.)
//! - [`models`] - Wallet, WalletTransaction (ledger), audit records
//! - [`config`] - YAML-backed application configuration
//! - [`error`] - The `WalletError` taxonomy
//! - [`store`] - WalletStore trait, PostgreSQL and in-memory backends
//! - [`wallet_id`] - Short human-shareable wallet id generation
//! - [`pin`] - Argon2id PIN hashing and the lockout state machine
//! - [`risk`] - Pure heuristic risk scoring for outgoing transfers
//! - [`rate_limit`] - Sliding-window rate limiter
//! - [`account`] - Wallet provisioning, lookup, search, PIN management
//! - [`transfer`] - The transfer engine pipeline
//! - [`deposit`] - Webhook-driven idempotent deposit crediting
//! - [`withdraw`] - Withdrawal requests
//! - [`reconcile`] - Cached-balance vs ledger drift reporting
//! - [`notify`] - Recipient notification seam
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod types;

pub mod store;

pub mod account;
pub mod deposit;
pub mod notify;
pub mod pin;
pub mod rate_limit;
pub mod reconcile;
pub mod risk;
pub mod transfer;
pub mod wallet_id;
pub mod withdraw;

// Convenient re-exports at crate root
pub use account::{WalletAccountService, WalletPublicInfo};
pub use config::AppConfig;
pub use deposit::{DepositNotice, DepositReceipt, DepositService};
pub use error::{LimitKind, WalletError};
pub use models::{Wallet, WalletAuditLog, WalletTransaction};
pub use notify::{LogNotifier, Notifier, TransferNotice};
pub use rate_limit::{RateLimitAction, RateLimiter};
pub use reconcile::{ReconciliationReport, Reconciler};
pub use risk::{RiskAssessment, RiskFlag};
pub use store::WalletStore;
pub use store::memory::MemWalletStore;
pub use store::postgres::PgWalletStore;
pub use transfer::{TransferEngine, TransferReceipt, TransferRequest};
pub use types::{MinorUnits, OwnerId, TransferId, WalletId, WalletStatus, now_ms};
pub use withdraw::{WithdrawReceipt, WithdrawRequest, WithdrawService};
