//! Wallet and ledger entities.

use oneclick_core::types::{DbId, Money, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `wallets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: DbId,
    pub client_id: DbId,
    /// Cached; always equal to the ledger sum.
    pub balance: Money,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `wallet_transactions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WalletTransaction {
    pub id: DbId,
    pub wallet_id: DbId,
    pub client_id: DbId,
    pub kind: String,
    /// Signed: deductions are negative.
    pub amount: Money,
    pub balance_after: Money,
    pub message_id: Option<DbId>,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Result of a debit attempt.
#[derive(Debug, Clone)]
pub enum DebitOutcome {
    Applied(WalletTransaction),
    /// Nothing was written.
    InsufficientFunds { balance: Money },
}

/// Result of a top-up.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Applied(WalletTransaction),
    /// The balance would pass [`oneclick_core::wallet::MAX_BALANCE`]; nothing was written.
    BalanceLimit { balance: Money },
}
