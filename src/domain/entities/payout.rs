//! Payout requests and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Transaction};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    /// PENDING -> PROCESSING -> COMPLETED / FAILED, or PENDING -> FAILED.
    pub enum PayoutStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

impl PayoutStatus {
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

string_enum! {
    pub enum PayoutMethod {
        Paypal => "paypal",
        Payoneer => "payoneer",
        StripeConnect => "stripe_connect",
    }
}

impl PayoutMethod {
    /// Methods the payment provider can execute; the rest are settled by an
    /// admin outside the platform.
    pub fn is_automated(self) -> bool {
        matches!(self, PayoutMethod::StripeConnect)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub freelancer_id: i64,
    pub amount_cents: Cents,
    pub currency: String,
    pub method: PayoutMethod,
    /// PayPal email, Payoneer id or connected account id
    pub destination: String,
    pub status: PayoutStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub processed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a payout request checked against the balance under lock.
#[derive(Debug, Clone)]
pub enum PayoutRequestOutcome {
    Created(Payout),
    InsufficientBalance { available: Cents },
}

/// Mutable fields written with a payout status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutUpdate {
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub processed_by: Option<i64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Payout>, AppError>;

    /// Lock the freelancer's ledger, check the balance covers the payout and
    /// insert it with its WITHDRAWAL entry.
    async fn create_with_withdrawal(
        &self,
        payout: &Payout,
        withdrawal: &Transaction,
    ) -> Result<PayoutRequestOutcome, AppError>;

    /// Conditional status change for non-failure transitions.
    async fn transition(
        &self,
        id: i64,
        from: &[PayoutStatus],
        to: PayoutStatus,
        update: &PayoutUpdate,
    ) -> Result<Option<Payout>, AppError>;

    /// Mark FAILED and credit the amount back with `reversal`.
    async fn fail(
        &self,
        id: i64,
        from: &[PayoutStatus],
        update: &PayoutUpdate,
        reversal: &Transaction,
    ) -> Result<Option<Payout>, AppError>;

    async fn list(
        &self,
        status: Option<PayoutStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Payout>, i64), AppError>;

    async fn list_for_freelancer(
        &self,
        freelancer_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Payout>, i64), AppError>;

    /// Count and amount still waiting for an admin.
    async fn pending_totals(&self) -> Result<(i64, Cents), AppError>;
}
