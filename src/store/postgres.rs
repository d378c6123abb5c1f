//! PostgreSQL wallet store.
//!
//! Balance debits are guarded CAS updates (`WHERE balance >= amount`);
//! the transfer commit wraps the balance movement and the ledger pair in
//! one database transaction so "both-or-neither" is enforced by the store
//! rather than assumed by convention. Idempotency keys and external
//! payment references are unique indexes; a violation is decoded back
//! into the benign "already processed" outcome.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use uuid::Uuid;

use super::{DepositCredit, TransferCommit, TransferPair, WalletStore, WithdrawalDebit};
use crate::error::WalletError;
use crate::models::{Wallet, WalletAuditLog, WalletTransaction};
use crate::types::{
    MinorUnits, OwnerId, TransferId, TxDirection, TxStatus, TxType, WalletId, WalletStatus,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS wallets_tb (
        wallet_id           TEXT PRIMARY KEY,
        owner_id            BIGINT NOT NULL UNIQUE,
        display_name        TEXT NOT NULL,
        balance             BIGINT NOT NULL DEFAULT 0,
        status              SMALLINT NOT NULL DEFAULT 1,
        pin_hash            TEXT,
        failed_pin_attempts INT NOT NULL DEFAULT 0,
        pin_locked_until_ms BIGINT,
        per_tx_limit        BIGINT NOT NULL DEFAULT 0,
        daily_limit         BIGINT NOT NULL DEFAULT 0,
        daily_transferred   BIGINT NOT NULL DEFAULT 0,
        daily_reset_at_ms   BIGINT NOT NULL DEFAULT 0,
        version             BIGINT NOT NULL DEFAULT 1,
        created_at_ms       BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wallet_tx_tb (
        transaction_id        TEXT PRIMARY KEY,
        wallet_id             TEXT NOT NULL,
        owner_id              BIGINT NOT NULL,
        tx_type               SMALLINT NOT NULL,
        direction             SMALLINT NOT NULL,
        amount                BIGINT NOT NULL,
        balance_before        BIGINT NOT NULL,
        balance_after         BIGINT NOT NULL,
        transfer_id           TEXT,
        counterpart_wallet_id TEXT,
        counterpart_owner_id  BIGINT,
        counterpart_name      TEXT,
        external_ref          TEXT,
        idempotency_key       TEXT,
        description           TEXT,
        status                SMALLINT NOT NULL,
        created_at_ms         BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS wallet_tx_idem_uidx
        ON wallet_tx_tb (wallet_id, idempotency_key)
        WHERE idempotency_key IS NOT NULL
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS wallet_tx_external_ref_uidx
        ON wallet_tx_tb (external_ref)
        WHERE external_ref IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS wallet_tx_wallet_idx
        ON wallet_tx_tb (wallet_id, created_at_ms)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS wallet_audit_tb (
        id            TEXT PRIMARY KEY,
        wallet_id     TEXT NOT NULL,
        action        TEXT NOT NULL,
        detail        TEXT NOT NULL,
        risk_score    SMALLINT,
        risk_flags    TEXT[] NOT NULL DEFAULT '{}',
        actor         TEXT NOT NULL,
        created_at_ms BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rate_limits_tb (
        subject         TEXT NOT NULL,
        action          TEXT NOT NULL,
        window_start_ms BIGINT NOT NULL,
        count           INT NOT NULL DEFAULT 0,
        expires_at_ms   BIGINT NOT NULL,
        PRIMARY KEY (subject, action, window_start_ms)
    )
    "#,
];

const TX_COLUMNS: &str = "transaction_id, wallet_id, owner_id, tx_type, direction, amount, \
     balance_before, balance_after, transfer_id, counterpart_wallet_id, counterpart_owner_id, \
     counterpart_name, external_ref, idempotency_key, description, status, created_at_ms";

pub struct PgWalletStore {
    pool: PgPool,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and create the schema if it does not exist yet.
    pub async fn connect(database_url: &str) -> Result<Self, WalletError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        tracing::info!("PostgreSQL connection pool established");
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), WalletError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_wallet(row: &PgRow) -> Result<Wallet, WalletError> {
        let status_id: i16 = row.get("status");
        let status = WalletStatus::from_id(status_id)
            .ok_or_else(|| WalletError::Storage(format!("invalid wallet status: {status_id}")))?;
        Ok(Wallet {
            wallet_id: WalletId::new(row.get::<String, _>("wallet_id")),
            owner_id: row.get("owner_id"),
            display_name: row.get("display_name"),
            balance: row.get("balance"),
            status,
            pin_hash: row.get("pin_hash"),
            failed_pin_attempts: row.get::<i32, _>("failed_pin_attempts") as u32,
            pin_locked_until_ms: row.get("pin_locked_until_ms"),
            per_tx_limit: row.get("per_tx_limit"),
            daily_limit: row.get("daily_limit"),
            daily_transferred: row.get("daily_transferred"),
            daily_reset_at_ms: row.get("daily_reset_at_ms"),
            version: row.get("version"),
            created_at_ms: row.get("created_at_ms"),
        })
    }

    fn row_to_tx(row: &PgRow) -> Result<WalletTransaction, WalletError> {
        let transaction_id: String = row.get("transaction_id");
        let transaction_id = Uuid::parse_str(&transaction_id)
            .map_err(|_| WalletError::Storage("invalid transaction_id format".to_string()))?;

        let tx_type_id: i16 = row.get("tx_type");
        let tx_type = TxType::from_id(tx_type_id)
            .ok_or_else(|| WalletError::Storage(format!("invalid tx_type: {tx_type_id}")))?;
        let direction_id: i16 = row.get("direction");
        let direction = TxDirection::from_id(direction_id)
            .ok_or_else(|| WalletError::Storage(format!("invalid direction: {direction_id}")))?;
        let status_id: i16 = row.get("status");
        let status = TxStatus::from_id(status_id)
            .ok_or_else(|| WalletError::Storage(format!("invalid tx status: {status_id}")))?;

        let transfer_id = row
            .get::<Option<String>, _>("transfer_id")
            .map(|s| {
                s.parse::<TransferId>()
                    .map_err(|_| WalletError::Storage("invalid transfer_id format".to_string()))
            })
            .transpose()?;

        Ok(WalletTransaction {
            transaction_id,
            wallet_id: WalletId::new(row.get::<String, _>("wallet_id")),
            owner_id: row.get("owner_id"),
            tx_type,
            direction,
            amount: row.get("amount"),
            balance_before: row.get("balance_before"),
            balance_after: row.get("balance_after"),
            transfer_id,
            counterpart_wallet_id: row
                .get::<Option<String>, _>("counterpart_wallet_id")
                .map(WalletId::new),
            counterpart_owner_id: row.get("counterpart_owner_id"),
            counterpart_name: row.get("counterpart_name"),
            external_ref: row.get("external_ref"),
            idempotency_key: row.get("idempotency_key"),
            description: row.get("description"),
            status,
            created_at_ms: row.get("created_at_ms"),
        })
    }

    async fn insert_tx<'e, E>(tx_row: &WalletTransaction, executor: E) -> Result<(), WalletError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO wallet_tx_tb
                (transaction_id, wallet_id, owner_id, tx_type, direction, amount,
                 balance_before, balance_after, transfer_id, counterpart_wallet_id,
                 counterpart_owner_id, counterpart_name, external_ref, idempotency_key,
                 description, status, created_at_ms)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(tx_row.transaction_id.to_string())
        .bind(tx_row.wallet_id.as_str())
        .bind(tx_row.owner_id)
        .bind(tx_row.tx_type.id())
        .bind(tx_row.direction.id())
        .bind(tx_row.amount)
        .bind(tx_row.balance_before)
        .bind(tx_row.balance_after)
        .bind(tx_row.transfer_id.map(|t| t.to_string()))
        .bind(tx_row.counterpart_wallet_id.as_ref().map(|w| w.as_str().to_string()))
        .bind(tx_row.counterpart_owner_id)
        .bind(tx_row.counterpart_name.as_deref())
        .bind(tx_row.external_ref.as_deref())
        .bind(tx_row.idempotency_key.as_deref())
        .bind(tx_row.description.as_deref())
        .bind(tx_row.status.id())
        .bind(tx_row.created_at_ms)
        .execute(executor)
        .await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn create_wallet(&self, wallet: &Wallet) -> Result<(), WalletError> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallets_tb
                (wallet_id, owner_id, display_name, balance, status, pin_hash,
                 failed_pin_attempts, pin_locked_until_ms, per_tx_limit, daily_limit,
                 daily_transferred, daily_reset_at_ms, version, created_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(wallet.wallet_id.as_str())
        .bind(wallet.owner_id)
        .bind(&wallet.display_name)
        .bind(wallet.balance)
        .bind(wallet.status.id())
        .bind(wallet.pin_hash.as_deref())
        .bind(wallet.failed_pin_attempts as i32)
        .bind(wallet.pin_locked_until_ms)
        .bind(wallet.per_tx_limit)
        .bind(wallet.daily_limit)
        .bind(wallet.daily_transferred)
        .bind(wallet.daily_reset_at_ms)
        .bind(wallet.version)
        .bind(wallet.created_at_ms)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(WalletError::AlreadyProcessed),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_wallet(&self, id: &WalletId) -> Result<Option<Wallet>, WalletError> {
        let row = sqlx::query("SELECT * FROM wallets_tb WHERE wallet_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }

    async fn get_wallet_by_owner(&self, owner: OwnerId) -> Result<Option<Wallet>, WalletError> {
        let row = sqlx::query("SELECT * FROM wallets_tb WHERE owner_id = $1")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }

    async fn search_wallets(
        &self,
        name_prefix: &str,
        limit: u32,
    ) -> Result<Vec<Wallet>, WalletError> {
        // Escape LIKE metacharacters so a prefix is always a literal prefix.
        let escaped = name_prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let rows = sqlx::query(
            r#"
            SELECT * FROM wallets_tb
            WHERE display_name ILIKE $1 || '%'
            ORDER BY display_name ASC
            LIMIT $2
            "#,
        )
        .bind(escaped)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_wallet).collect()
    }

    async fn wallet_id_exists(&self, id: &WalletId) -> Result<bool, WalletError> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM wallets_tb WHERE wallet_id = $1",
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists > 0)
    }

    async fn upgrade_legacy_wallet(
        &self,
        id: &WalletId,
        per_tx_limit: MinorUnits,
        daily_limit: MinorUnits,
    ) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets_tb
            SET per_tx_limit = CASE WHEN per_tx_limit = 0 THEN $1 ELSE per_tx_limit END,
                daily_limit  = CASE WHEN daily_limit = 0 THEN $2 ELSE daily_limit END
            WHERE wallet_id = $3
            "#,
        )
        .bind(per_tx_limit)
        .bind(daily_limit)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_pin_hash(&self, id: &WalletId, hash: &str) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets_tb
            SET pin_hash = $1, failed_pin_attempts = 0, pin_locked_until_ms = NULL
            WHERE wallet_id = $2
            "#,
        )
        .bind(hash)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_pin_failures(&self, id: &WalletId) -> Result<u32, WalletError> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE wallets_tb
            SET failed_pin_attempts = failed_pin_attempts + 1
            WHERE wallet_id = $1
            RETURNING failed_pin_attempts
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        Ok(count as u32)
    }

    async fn lock_pin(&self, id: &WalletId, until_ms: i64) -> Result<(), WalletError> {
        sqlx::query("UPDATE wallets_tb SET pin_locked_until_ms = $1 WHERE wallet_id = $2")
            .bind(until_ms)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_pin_failures(&self, id: &WalletId) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets_tb
            SET failed_pin_attempts = 0, pin_locked_until_ms = NULL
            WHERE wallet_id = $1
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_daily_window(
        &self,
        id: &WalletId,
        reset_at_ms: i64,
    ) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets_tb
            SET daily_transferred = 0, daily_reset_at_ms = $1
            WHERE wallet_id = $2
            "#,
        )
        .bind(reset_at_ms)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        wallet: &WalletId,
        key: &str,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM wallet_tx_tb WHERE wallet_id = $1 AND idempotency_key = $2"
        ))
        .bind(wallet.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_tx(&r)).transpose()
    }

    async fn find_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM wallet_tx_tb WHERE external_ref = $1"
        ))
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_tx(&r)).transpose()
    }

    async fn commit_transfer(
        &self,
        commit: &TransferCommit,
    ) -> Result<TransferPair, WalletError> {
        let mut tx = self.pool.begin().await?;

        // Conditional debit: the balance guard re-checks at write time, so
        // losing a race never over-commits funds.
        let debited = sqlx::query(
            r#"
            UPDATE wallets_tb
            SET balance = balance - $1,
                daily_transferred = daily_transferred + $1,
                version = version + 1
            WHERE wallet_id = $2 AND status = 1 AND balance >= $1
            RETURNING balance
            "#,
        )
        .bind(commit.amount)
        .bind(commit.sender_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(debited) = debited else {
            tx.rollback().await?;
            // Matched no record: distinguish why for the caller.
            let current = self.get_wallet(&commit.sender_id).await?;
            return Err(match current {
                None => WalletError::NotFound(commit.sender_id.to_string()),
                Some(w) if !w.is_active() => WalletError::InactiveWallet {
                    wallet_id: w.wallet_id.to_string(),
                    status: w.status.to_string(),
                },
                Some(w) if w.balance < commit.amount => WalletError::InsufficientBalance,
                Some(_) => WalletError::ConcurrencyConflict,
            });
        };
        let sender_after: i64 = debited.get("balance");
        let sender_before = sender_after + commit.amount;

        let credited = sqlx::query(
            r#"
            UPDATE wallets_tb
            SET balance = balance + $1, version = version + 1
            WHERE wallet_id = $2
            RETURNING balance
            "#,
        )
        .bind(commit.amount)
        .bind(commit.recipient_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(credited) = credited else {
            tx.rollback().await?;
            return Err(WalletError::NotFound(commit.recipient_id.to_string()));
        };
        let recipient_after: i64 = credited.get("balance");
        let recipient_before = recipient_after - commit.amount;

        let debit = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: commit.sender_id.clone(),
            owner_id: commit.sender_owner,
            tx_type: TxType::TransferOut,
            direction: TxDirection::Debit,
            amount: commit.amount,
            balance_before: sender_before,
            balance_after: sender_after,
            transfer_id: Some(commit.transfer_id),
            counterpart_wallet_id: Some(commit.recipient_id.clone()),
            counterpart_owner_id: Some(commit.recipient_owner),
            counterpart_name: Some(commit.recipient_name.clone()),
            external_ref: None,
            idempotency_key: Some(commit.idempotency_key.clone()),
            description: commit.description.clone(),
            status: TxStatus::Completed,
            created_at_ms: commit.now_ms,
        };
        let credit = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: commit.recipient_id.clone(),
            owner_id: commit.recipient_owner,
            tx_type: TxType::TransferIn,
            direction: TxDirection::Credit,
            amount: commit.amount,
            balance_before: recipient_before,
            balance_after: recipient_after,
            transfer_id: Some(commit.transfer_id),
            counterpart_wallet_id: Some(commit.sender_id.clone()),
            counterpart_owner_id: Some(commit.sender_owner),
            counterpart_name: Some(commit.sender_name.clone()),
            external_ref: None,
            idempotency_key: Some(commit.idempotency_key.clone()),
            description: commit.description.clone(),
            status: TxStatus::Completed,
            created_at_ms: commit.now_ms,
        };

        for row in [&debit, &credit] {
            if let Err(e) = Self::insert_tx(row, &mut *tx).await {
                // A duplicate idempotency key here means a concurrent
                // duplicate request committed first; the transaction
                // rolls back and the caller replays the recorded outcome.
                return Err(match e {
                    WalletError::Database(ref db) if is_unique_violation(db) => {
                        WalletError::AlreadyProcessed
                    }
                    other => other,
                });
            }
        }

        tx.commit().await?;
        Ok(TransferPair { debit, credit })
    }

    async fn credit_deposit(
        &self,
        credit: &DepositCredit,
    ) -> Result<(WalletTransaction, bool), WalletError> {
        if let Some(existing) = self.find_by_external_ref(&credit.external_ref).await? {
            return Ok((existing, true));
        }

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE wallets_tb
            SET balance = balance + $1, version = version + 1
            WHERE wallet_id = $2
            RETURNING owner_id, balance
            "#,
        )
        .bind(credit.amount)
        .bind(credit.wallet_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(WalletError::NotFound(credit.wallet_id.to_string()));
        };
        let balance_after: i64 = row.get("balance");
        let owner_id: i64 = row.get("owner_id");

        let entry = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: credit.wallet_id.clone(),
            owner_id,
            tx_type: TxType::Deposit,
            direction: TxDirection::Credit,
            amount: credit.amount,
            balance_before: balance_after - credit.amount,
            balance_after,
            transfer_id: None,
            counterpart_wallet_id: None,
            counterpart_owner_id: None,
            counterpart_name: None,
            external_ref: Some(credit.external_ref.clone()),
            idempotency_key: None,
            description: None,
            status: TxStatus::Completed,
            created_at_ms: credit.now_ms,
        };

        match Self::insert_tx(&entry, &mut *tx).await {
            Ok(()) => {
                tx.commit().await?;
                Ok((entry, false))
            }
            Err(WalletError::Database(ref db)) if is_unique_violation(db) => {
                // Two webhook deliveries raced; the other one won. Roll
                // back our credit and return its recorded result.
                tx.rollback().await?;
                let existing = self
                    .find_by_external_ref(&credit.external_ref)
                    .await?
                    .ok_or_else(|| {
                        WalletError::Storage("duplicate external ref vanished".to_string())
                    })?;
                Ok((existing, true))
            }
            Err(e) => Err(e),
        }
    }

    async fn debit_withdrawal(
        &self,
        debit: &WithdrawalDebit,
    ) -> Result<WalletTransaction, WalletError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE wallets_tb
            SET balance = balance - $1, version = version + 1
            WHERE wallet_id = $2 AND status = 1 AND balance >= $1
            RETURNING owner_id, balance
            "#,
        )
        .bind(debit.amount)
        .bind(debit.wallet_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            let current = self.get_wallet(&debit.wallet_id).await?;
            return Err(match current {
                None => WalletError::NotFound(debit.wallet_id.to_string()),
                Some(_) => WalletError::InsufficientBalance,
            });
        };
        let balance_after: i64 = row.get("balance");
        let owner_id: i64 = row.get("owner_id");

        let entry = WalletTransaction {
            transaction_id: Uuid::new_v4(),
            wallet_id: debit.wallet_id.clone(),
            owner_id,
            tx_type: TxType::Withdrawal,
            direction: TxDirection::Debit,
            amount: debit.amount,
            balance_before: balance_after + debit.amount,
            balance_after,
            transfer_id: None,
            counterpart_wallet_id: None,
            counterpart_owner_id: None,
            counterpart_name: None,
            external_ref: None,
            idempotency_key: None,
            description: debit.description.clone(),
            status: TxStatus::Completed,
            created_at_ms: debit.now_ms,
        };
        Self::insert_tx(&entry, &mut *tx).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn recent_transfer_outs(
        &self,
        wallet: &WalletId,
        since_ms: i64,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TX_COLUMNS} FROM wallet_tx_tb
            WHERE wallet_id = $1 AND tx_type = $2 AND status = $3 AND created_at_ms >= $4
            ORDER BY created_at_ms DESC
            "#
        ))
        .bind(wallet.as_str())
        .bind(TxType::TransferOut.id())
        .bind(TxStatus::Completed.id())
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_tx).collect()
    }

    async fn ledger_balance(&self, wallet: &WalletId) -> Result<MinorUnits, WalletError> {
        let sum = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT SUM(CASE WHEN direction = $1 THEN amount ELSE -amount END)
            FROM wallet_tx_tb
            WHERE wallet_id = $2 AND status = $3
            "#,
        )
        .bind(TxDirection::Credit.id())
        .bind(wallet.as_str())
        .bind(TxStatus::Completed.id())
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    async fn append_audit(&self, entry: &WalletAuditLog) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_audit_tb
                (id, wallet_id, action, detail, risk_score, risk_flags, actor, created_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.wallet_id.as_str())
        .bind(&entry.action)
        .bind(entry.detail.to_string())
        .bind(entry.risk_score.map(|s| s as i16))
        .bind(&entry.risk_flags)
        .bind(&entry.actor)
        .bind(entry.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn incr_rate_counter(
        &self,
        subject: &str,
        action: &str,
        window_start_ms: i64,
        expires_at_ms: i64,
    ) -> Result<u32, WalletError> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO rate_limits_tb (subject, action, window_start_ms, count, expires_at_ms)
            VALUES ($1, $2, $3, 1, $4)
            ON CONFLICT (subject, action, window_start_ms)
            DO UPDATE SET count = rate_limits_tb.count + 1
            RETURNING count
            "#,
        )
        .bind(subject)
        .bind(action)
        .bind(window_start_ms)
        .bind(expires_at_ms)
        .fetch_one(&self.pool)
        .await?;

        // New window: cheap moment to sweep counters that already expired.
        if count == 1 {
            sqlx::query("DELETE FROM rate_limits_tb WHERE expires_at_ms < $1")
                .bind(window_start_ms)
                .execute(&self.pool)
                .await?;
        }

        Ok(count as u32)
    }
}
