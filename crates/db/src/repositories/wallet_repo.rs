//! Repository for the `wallets` and `wallet_transactions` tables.
//!
//! Every ledger append locks the client's `wallets` row first (`FOR UPDATE`),
//! so debits for the same client are serialized and the check-then-append
//! runs against a consistent balance. The cached `wallets.balance` is
//! updated in the same transaction as the append.

use oneclick_core::error::CoreError;
use oneclick_core::types::{DbId, Money};
use oneclick_core::wallet::{self, TransactionKind};
use sqlx::{PgConnection, PgPool};

use crate::models::wallet::{CreditOutcome, DebitOutcome, Wallet, WalletTransaction};

const WALLET_COLUMNS: &str = "id, client_id, balance, created_at, updated_at";

const TX_COLUMNS: &str = "\
    id, wallet_id, client_id, kind, amount, balance_after, message_id, \
    description, created_at, updated_at";

/// Provides the wallet ledger operations.
pub struct WalletRepo;

impl WalletRepo {
    /// Lock (creating if needed) the client's wallet row inside `conn`'s transaction.
    async fn lock_wallet(conn: &mut PgConnection, client_id: DbId) -> Result<Wallet, sqlx::Error> {
        sqlx::query(
            "INSERT INTO wallets (client_id) VALUES ($1) \
             ON CONFLICT (client_id) DO NOTHING",
        )
        .bind(client_id)
        .execute(&mut *conn)
        .await?;

        let query = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE client_id = $1 FOR UPDATE");
        sqlx::query_as::<_, Wallet>(&query)
            .bind(client_id)
            .fetch_one(&mut *conn)
            .await
    }

    /// Append one ledger row and move the cached balance to `balance_after`.
    async fn append(
        conn: &mut PgConnection,
        wallet: &Wallet,
        kind: TransactionKind,
        magnitude: Money,
        balance_after: Money,
        message_id: Option<DbId>,
        description: Option<&str>,
    ) -> Result<WalletTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO wallet_transactions \
                (wallet_id, client_id, kind, amount, balance_after, message_id, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {TX_COLUMNS}"
        );
        let tx_row = sqlx::query_as::<_, WalletTransaction>(&query)
            .bind(wallet.id)
            .bind(wallet.client_id)
            .bind(kind.as_str())
            .bind(kind.signed_amount(magnitude))
            .bind(balance_after)
            .bind(message_id)
            .bind(description)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query("UPDATE wallets SET balance = $2 WHERE id = $1")
            .bind(wallet.id)
            .bind(balance_after)
            .execute(&mut *conn)
            .await?;

        Ok(tx_row)
    }

    /// Debit `amount` for a message, atomically with respect to other debits.
    ///
    /// On success the message's `cost` is recorded in the same transaction.
    /// An insufficient balance writes nothing.
    pub async fn debit(
        pool: &PgPool,
        client_id: DbId,
        amount: Money,
        message_id: Option<DbId>,
        description: Option<&str>,
    ) -> Result<DebitOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let wallet = Self::lock_wallet(&mut tx, client_id).await?;

        let balance_after = match wallet::apply_debit(wallet.balance, amount) {
            Ok(b) => b,
            Err(CoreError::InsufficientFunds { balance, .. }) => {
                tracing::debug!(client_id, %amount, %balance, "Debit refused: insufficient balance");
                tx.rollback().await?;
                return Ok(DebitOutcome::InsufficientFunds { balance });
            }
            Err(e) => return Err(sqlx::Error::Encode(Box::new(e))),
        };

        let row = Self::append(
            &mut tx,
            &wallet,
            TransactionKind::Deduction,
            amount,
            balance_after,
            message_id,
            description,
        )
        .await?;

        if let Some(message_id) = message_id {
            sqlx::query("UPDATE messages SET cost = $2 WHERE id = $1")
                .bind(message_id)
                .bind(amount)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(DebitOutcome::Applied(row))
    }

    /// Top up a client's wallet. The caller validates the amount itself.
    ///
    /// A top-up that would push the balance past the column limit writes nothing.
    pub async fn credit(
        pool: &PgPool,
        client_id: DbId,
        amount: Money,
        description: Option<&str>,
    ) -> Result<CreditOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let wallet = Self::lock_wallet(&mut tx, client_id).await?;

        let Ok(balance_after) = wallet::apply_credit(wallet.balance, amount) else {
            tracing::debug!(client_id, %amount, balance = %wallet.balance, "Credit refused: balance limit");
            tx.rollback().await?;
            return Ok(CreditOutcome::BalanceLimit {
                balance: wallet.balance,
            });
        };

        let row = Self::append(
            &mut tx,
            &wallet,
            TransactionKind::TopUp,
            amount,
            balance_after,
            None,
            description,
        )
        .await?;
        tx.commit().await?;
        Ok(CreditOutcome::Applied(row))
    }

    /// Reverse a message's debit. Idempotent: returns `None` if it was already refunded.
    pub async fn refund(
        pool: &PgPool,
        client_id: DbId,
        message_id: DbId,
        amount: Money,
        description: Option<&str>,
    ) -> Result<Option<WalletTransaction>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let wallet = Self::lock_wallet(&mut tx, client_id).await?;

        let already: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM wallet_transactions \
                            WHERE message_id = $1 AND kind = 'refund')",
        )
        .bind(message_id)
        .fetch_one(&mut *tx)
        .await?;
        if already.0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = Self::append(
            &mut tx,
            &wallet,
            TransactionKind::Refund,
            amount,
            wallet.balance + amount,
            Some(message_id),
            description,
        )
        .await?;
        tx.commit().await?;
        Ok(Some(row))
    }

    /// Balance as the sum of the ledger (the authoritative read).
    pub async fn balance(pool: &PgPool, client_id: DbId) -> Result<Money, sqlx::Error> {
        let row: (Money,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM wallet_transactions WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn find_wallet(pool: &PgPool, client_id: DbId) -> Result<Option<Wallet>, sqlx::Error> {
        let query = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE client_id = $1");
        sqlx::query_as::<_, Wallet>(&query)
            .bind(client_id)
            .fetch_optional(pool)
            .await
    }

    /// A client's ledger, newest first.
    pub async fn list_transactions(
        pool: &PgPool,
        client_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {TX_COLUMNS} FROM wallet_transactions \
             WHERE client_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, WalletTransaction>(&query)
            .bind(client_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_transactions(pool: &PgPool, client_id: DbId) -> Result<i64, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallet_transactions WHERE client_id = $1")
                .bind(client_id)
                .fetch_one(pool)
                .await?;
        Ok(row.0)
    }
}
