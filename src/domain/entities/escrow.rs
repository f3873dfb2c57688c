//! Escrow entity and repository trait.
//!
//! An escrow holds a client's payment for one project or one service order
//! until the work is accepted (release) or the deal is called off (refund).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, OrderStatus, ProjectStatus, Transaction};
use crate::shared::error::AppError;

string_enum! {
    /// PENDING -> FUNDED -> RELEASED / REFUNDED, or PENDING -> REFUNDED.
    pub enum EscrowStatus {
        Pending => "pending",
        Funded => "funded",
        Released => "released",
        Refunded => "refunded",
    }
}

impl EscrowStatus {
    pub fn can_transition_to(self, next: EscrowStatus) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (Pending, Funded) | (Pending, Refunded) | (Funded, Released) | (Funded, Refunded)
        )
    }

    pub fn is_settled(self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

/// What the escrow pays for. Exactly one of project or order is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowSubject {
    Project(i64),
    Order(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub id: i64,
    pub project_id: Option<i64>,
    pub order_id: Option<i64>,
    /// Paying side (project client or order buyer)
    pub client_id: i64,
    /// Receiving side (assigned freelancer or order seller)
    pub freelancer_id: i64,
    pub amount_cents: Cents,
    /// Platform fee withheld on release; zero until then
    pub fee_cents: Cents,
    pub currency: String,
    pub status: EscrowStatus,
    pub payment_intent_id: Option<String>,
    /// Provider id of the refund that returned captured funds. Unset on a
    /// refunded escrow until the provider accepts the refund.
    pub provider_refund_id: Option<String>,
    pub funded_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    /// A fresh PENDING escrow for `subject`.
    pub fn pending(
        id: i64,
        subject: EscrowSubject,
        client_id: i64,
        freelancer_id: i64,
        amount_cents: Cents,
        currency: &str,
    ) -> Self {
        let now = Utc::now();
        let (project_id, order_id) = match subject {
            EscrowSubject::Project(p) => (Some(p), None),
            EscrowSubject::Order(o) => (None, Some(o)),
        };
        Self {
            id,
            project_id,
            order_id,
            client_id,
            freelancer_id,
            amount_cents,
            fee_cents: 0,
            currency: currency.to_string(),
            status: EscrowStatus::Pending,
            payment_intent_id: None,
            provider_refund_id: None,
            funded_at: None,
            released_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subject(&self) -> Option<EscrowSubject> {
        match (self.project_id, self.order_id) {
            (Some(p), None) => Some(EscrowSubject::Project(p)),
            (None, Some(o)) => Some(EscrowSubject::Order(o)),
            _ => None,
        }
    }

    pub fn is_party(&self, user_id: i64) -> bool {
        self.client_id == user_id || self.freelancer_id == user_id
    }
}

/// Status change applied to the escrow's project or order in the same
/// database transaction as a release or refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectTransition {
    Project {
        id: i64,
        from: Vec<ProjectStatus>,
        to: ProjectStatus,
    },
    Order {
        id: i64,
        from: Vec<OrderStatus>,
        to: OrderStatus,
    },
}

/// Count and total amount of escrows in one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EscrowTotals {
    pub status: EscrowStatus,
    pub count: i64,
    pub amount_cents: Cents,
}

/// Repository trait for escrows.
///
/// Settlement methods return `None` when the escrow (or the accompanying
/// subject transition) no longer matches the expected state; nothing is
/// written in that case.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EscrowRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Escrow>, AppError>;

    async fn find_by_project(&self, project_id: i64) -> Result<Option<Escrow>, AppError>;

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Escrow>, AppError>;

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Escrow>, AppError>;

    /// Record the provider intent on a PENDING escrow.
    async fn attach_payment_intent(
        &self,
        id: i64,
        intent_id: &str,
    ) -> Result<Option<Escrow>, AppError>;

    /// PENDING -> FUNDED with the DEPOSIT ledger entry.
    async fn mark_funded(&self, id: i64, deposit: &Transaction)
        -> Result<Option<Escrow>, AppError>;

    /// FUNDED -> RELEASED, storing `fee_cents` and writing `entries`.
    async fn release(
        &self,
        id: i64,
        fee_cents: Cents,
        entries: &[Transaction],
        subject: Option<SubjectTransition>,
    ) -> Result<Option<Escrow>, AppError>;

    /// `from` -> REFUNDED, writing `entries` (empty for unfunded escrows).
    /// Commits before any money moves at the provider.
    async fn refund(
        &self,
        id: i64,
        from: EscrowStatus,
        entries: &[Transaction],
        subject: Option<SubjectTransition>,
    ) -> Result<Option<Escrow>, AppError>;

    /// Store the provider refund id once the money is on its way back.
    async fn record_provider_refund(
        &self,
        id: i64,
        refund_id: &str,
    ) -> Result<Option<Escrow>, AppError>;

    /// Funded escrows refunded before `refunded_before` whose provider
    /// refund never went through.
    async fn find_owing_provider_refund(
        &self,
        refunded_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Escrow>, AppError>;

    async fn totals_by_status(&self) -> Result<Vec<EscrowTotals>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use EscrowStatus::*;

    #[test]
    fn test_settled_escrows_are_final() {
        for next in EscrowStatus::ALL {
            assert!(!Released.can_transition_to(*next));
            assert!(!Refunded.can_transition_to(*next));
        }
    }

    #[test]
    fn test_release_requires_funding() {
        assert!(!Pending.can_transition_to(Released));
        assert!(Funded.can_transition_to(Released));
        assert!(Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_subject() {
        let escrow = Escrow::pending(1, EscrowSubject::Order(9), 2, 3, 5000, "usd");
        assert_eq!(escrow.subject(), Some(EscrowSubject::Order(9)));
        assert_eq!(escrow.project_id, None);
        assert!(escrow.is_party(2));
        assert!(escrow.is_party(3));
        assert!(!escrow.is_party(4));
    }
}
