//! Ledger entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Cents;
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    /// Amounts are always positive; the kind says which way money moved.
    pub enum TransactionKind {
        /// Client paid into escrow
        Deposit => "deposit",
        /// Freelancer moved funds out through a payout
        Withdrawal => "withdrawal",
        /// Platform commission withheld on release
        Fee => "fee",
        /// Freelancer's share of a released escrow
        Earning => "earning",
        /// Escrow returned to the client
        Refund => "refund",
        /// Failed payout credited back
        Reversal => "reversal",
    }
}

impl TransactionKind {
    /// Effect on a freelancer's withdrawable balance: +1, -1 or 0.
    pub fn balance_sign(self) -> i64 {
        match self {
            TransactionKind::Earning | TransactionKind::Reversal => 1,
            TransactionKind::Withdrawal => -1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub kind: TransactionKind,
    pub amount_cents: Cents,
    pub currency: String,
    pub escrow_id: Option<i64>,
    pub payout_id: Option<i64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        id: i64,
        user_id: i64,
        kind: TransactionKind,
        amount_cents: Cents,
        currency: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            kind,
            amount_cents,
            currency: currency.to_string(),
            escrow_id: None,
            payout_id: None,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    pub fn for_escrow(mut self, escrow_id: i64) -> Self {
        self.escrow_id = Some(escrow_id);
        self
    }

    pub fn for_payout(mut self, payout_id: i64) -> Self {
        self.payout_id = Some(payout_id);
        self
    }
}

/// Sum the balance effect of `entries`.
pub fn balance_of(entries: &[Transaction]) -> Cents {
    entries
        .iter()
        .map(|t| t.kind.balance_sign() * t.amount_cents)
        .sum()
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Transaction>, i64), AppError>;

    /// EARNING + REVERSAL - WITHDRAWAL for `user_id`.
    async fn available_balance(&self, user_id: i64) -> Result<Cents, AppError>;

    /// Platform-wide totals per kind, for the admin dashboard.
    async fn totals_by_kind(&self) -> Result<Vec<(TransactionKind, Cents)>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_of() {
        let entries = vec![
            Transaction::new(1, 7, TransactionKind::Earning, 9000, "usd", "release"),
            Transaction::new(2, 7, TransactionKind::Fee, 1000, "usd", "fee"),
            Transaction::new(3, 7, TransactionKind::Withdrawal, 5000, "usd", "payout"),
            Transaction::new(4, 7, TransactionKind::Reversal, 5000, "usd", "payout failed"),
            Transaction::new(5, 7, TransactionKind::Deposit, 10000, "usd", "other role"),
        ];
        assert_eq!(balance_of(&entries), 9000);
    }

    #[test]
    fn test_links() {
        let tx = Transaction::new(1, 2, TransactionKind::Deposit, 100, "usd", "x").for_escrow(5);
        assert_eq!(tx.escrow_id, Some(5));
        assert_eq!(tx.payout_id, None);
    }
}
