//! Wallet ledger arithmetic.
//!
//! The ledger is append-only. Top-ups and refunds are stored positive,
//! deductions negative; the balance is the plain sum of `amount`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Money;

/// Reason recorded on a message that could not be paid for.
pub const INSUFFICIENT_BALANCE_REASON: &str = "insufficient balance";

/// Largest single top-up.
pub const MAX_TOP_UP: Money = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Largest balance a wallet can hold (`NUMERIC(14,4)`): 9999999999.9999.
pub const MAX_BALANCE: Money = Decimal::from_parts(276_447_231, 23_283, 0, false, 4);

/// Ledger row kind, stored in `wallet_transactions.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TopUp,
    Deduction,
    Refund,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::TopUp => "top_up",
            TransactionKind::Deduction => "deduction",
            TransactionKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top_up" => Some(TransactionKind::TopUp),
            "deduction" => Some(TransactionKind::Deduction),
            "refund" => Some(TransactionKind::Refund),
            _ => None,
        }
    }

    /// Sign the (positive) magnitude the way the ledger stores it.
    pub fn signed_amount(self, magnitude: Money) -> Money {
        match self {
            TransactionKind::Deduction => -magnitude,
            TransactionKind::TopUp | TransactionKind::Refund => magnitude,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credits must be strictly positive and at most [`MAX_TOP_UP`].
pub fn validate_credit(amount: Money) -> Result<(), CoreError> {
    if amount <= Money::ZERO {
        return Err(CoreError::Validation(
            "Top-up amount must be greater than 0".to_string(),
        ));
    }
    if amount > MAX_TOP_UP {
        return Err(CoreError::Validation(format!(
            "Top-up amount must not exceed {MAX_TOP_UP}"
        )));
    }
    if amount.normalize().scale() > 4 {
        return Err(CoreError::Validation(
            "Top-up amount supports at most 4 decimal places".to_string(),
        ));
    }
    Ok(())
}

/// Balance after crediting `amount`, or a validation error past [`MAX_BALANCE`].
pub fn apply_credit(balance: Money, amount: Money) -> Result<Money, CoreError> {
    match balance.checked_add(amount) {
        Some(after) if after <= MAX_BALANCE => Ok(after),
        _ => Err(CoreError::Validation(format!(
            "Top-up would take the balance above {MAX_BALANCE}"
        ))),
    }
}

/// Balance after debiting `amount`, or `InsufficientFunds` when it would go negative.
///
/// A zero-priced debit always succeeds.
pub fn apply_debit(balance: Money, amount: Money) -> Result<Money, CoreError> {
    if amount < Money::ZERO {
        return Err(CoreError::Validation(
            "Debit amount must not be negative".to_string(),
        ));
    }
    if amount > balance {
        return Err(CoreError::InsufficientFunds {
            balance,
            required: amount,
        });
    }
    Ok(balance - amount)
}

/// Sum of signed ledger amounts.
pub fn balance_of<'a>(amounts: impl IntoIterator<Item = &'a Money>) -> Money {
    amounts.into_iter().copied().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn debit_within_balance() {
        assert_eq!(apply_debit(dec!(0.05), dec!(0.03)).unwrap(), dec!(0.02));
        assert_eq!(apply_debit(dec!(0.03), dec!(0.03)).unwrap(), dec!(0));
    }

    #[test]
    fn debit_over_balance_is_insufficient() {
        assert_matches!(
            apply_debit(dec!(0.02), dec!(0.03)),
            Err(CoreError::InsufficientFunds { balance, required })
                if balance == dec!(0.02) && required == dec!(0.03)
        );
    }

    #[test]
    fn zero_price_debit_always_succeeds() {
        assert_eq!(apply_debit(dec!(0), dec!(0)).unwrap(), dec!(0));
    }

    #[test]
    fn negative_debit_rejected() {
        assert_matches!(
            apply_debit(dec!(1), dec!(-1)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn credit_must_be_positive() {
        assert!(validate_credit(dec!(10)).is_ok());
        assert!(validate_credit(dec!(0)).is_err());
        assert!(validate_credit(dec!(-5)).is_err());
        assert!(validate_credit(dec!(0.00001)).is_err());
    }

    #[test]
    fn credit_is_capped() {
        assert!(validate_credit(dec!(1000000)).is_ok());
        assert_matches!(
            validate_credit(dec!(1000000.0001)),
            Err(CoreError::Validation(ref m)) if m.contains("1000000")
        );
        assert!(validate_credit(dec!(1000000000000)).is_err());
    }

    #[test]
    fn balance_cannot_pass_the_column_limit() {
        assert_eq!(MAX_BALANCE, dec!(9999999999.9999));
        assert_eq!(apply_credit(dec!(5), dec!(0.05)).unwrap(), dec!(5.05));
        assert_eq!(
            apply_credit(dec!(9999999998.9999), dec!(1)).unwrap(),
            MAX_BALANCE
        );
        assert_matches!(
            apply_credit(dec!(9999999999.9999), dec!(0.0001)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn ledger_signs_and_sum() {
        let rows = [
            TransactionKind::TopUp.signed_amount(dec!(0.05)),
            TransactionKind::Deduction.signed_amount(dec!(0.03)),
            TransactionKind::Refund.signed_amount(dec!(0.03)),
            TransactionKind::Deduction.signed_amount(dec!(0.03)),
        ];
        assert_eq!(balance_of(&rows), dec!(0.02));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for k in [
            TransactionKind::TopUp,
            TransactionKind::Deduction,
            TransactionKind::Refund,
        ] {
            assert_eq!(TransactionKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(TransactionKind::parse("bonus"), None);
    }
}
