//! Service order entity, lifecycle, and repository trait.
//!
//! Maps to the `service_orders` table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Escrow, PackageTier};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    /// PENDING -> ACCEPTED -> IN_PROGRESS -> DELIVERED -> COMPLETED,
    /// plus CANCELLED and DISPUTED.
    pub enum OrderStatus {
        Pending => "pending",
        Accepted => "accepted",
        InProgress => "in_progress",
        Delivered => "delivered",
        Completed => "completed",
        Cancelled => "cancelled",
        Disputed => "disputed",
    }
}

impl OrderStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Delivered)
                | (InProgress, Disputed)
                | (Delivered, InProgress)
                | (Delivered, Completed)
                | (Delivered, Disputed)
                | (Disputed, Completed)
                | (Disputed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Every status that may move to `next`.
    pub fn sources_of(next: OrderStatus) -> Vec<OrderStatus> {
        OrderStatus::ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

/// Which side of an order a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderParty {
    Buyer,
    Seller,
}

/// A purchase of one package of a service.
///
/// Price, delivery time and revisions are copied from the package when the
/// order is placed, so later package edits do not affect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: i64,
    pub service_id: i64,
    pub package_tier: PackageTier,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub title: String,
    pub price_cents: Cents,
    pub delivery_days: i32,
    pub revisions_allowed: i32,
    pub revisions_used: i32,
    pub requirements: String,
    pub delivery_note: Option<String>,
    pub status: OrderStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceOrder {
    pub fn party_of(&self, user_id: i64) -> Option<OrderParty> {
        if self.buyer_id == user_id {
            Some(OrderParty::Buyer)
        } else if self.seller_id == user_id {
            Some(OrderParty::Seller)
        } else {
            None
        }
    }

    pub fn counterparty(&self, user_id: i64) -> Option<i64> {
        match self.party_of(user_id)? {
            OrderParty::Buyer => Some(self.seller_id),
            OrderParty::Seller => Some(self.buyer_id),
        }
    }

    pub fn revisions_remaining(&self) -> i32 {
        (self.revisions_allowed - self.revisions_used).max(0)
    }

    /// Seller starts work: the due date counts from now.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::InProgress;
        self.due_at = Some(now + Duration::days(self.delivery_days as i64));
        self.updated_at = now;
    }

    pub fn deliver(&mut self, note: String, now: DateTime<Utc>) {
        self.status = OrderStatus::Delivered;
        self.delivery_note = Some(note);
        self.delivered_at = Some(now);
        self.updated_at = now;
    }

    /// Buyer sends a delivery back. Callers check `revisions_remaining` first.
    pub fn request_revision(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::InProgress;
        self.revisions_used += 1;
        self.delivered_at = None;
        self.updated_at = now;
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
    }
}

impl Default for ServiceOrder {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            service_id: 0,
            package_tier: PackageTier::Basic,
            buyer_id: 0,
            seller_id: 0,
            title: String::new(),
            price_cents: 0,
            delivery_days: 1,
            revisions_allowed: 0,
            revisions_used: 0,
            requirements: String::new(),
            delivery_note: None,
            status: OrderStatus::Pending,
            due_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository trait for service orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<ServiceOrder>, AppError>;

    /// Insert the order and its PENDING escrow in one transaction.
    async fn create_with_escrow(
        &self,
        order: &ServiceOrder,
        escrow: &Escrow,
    ) -> Result<ServiceOrder, AppError>;

    async fn list_for_user(
        &self,
        user_id: i64,
        party: OrderParty,
        page: PageRequest,
    ) -> Result<(Vec<ServiceOrder>, i64), AppError>;

    /// Persist the mutable fields of `order` if its stored status is still
    /// in `from`. Returns `None` when another writer got there first.
    async fn save_transition(
        &self,
        order: &ServiceOrder,
        from: &[OrderStatus],
    ) -> Result<Option<ServiceOrder>, AppError>;

    /// DELIVERED orders delivered before `cutoff`, oldest first.
    async fn find_auto_completable(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ServiceOrder>, AppError>;

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<ServiceOrder>, AppError>;

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use OrderStatus::*;

    #[test_case(Pending, Accepted => true)]
    #[test_case(Pending, InProgress => false; "cannot skip acceptance")]
    #[test_case(Accepted, InProgress => true)]
    #[test_case(InProgress, Delivered => true)]
    #[test_case(Delivered, InProgress => true; "revision")]
    #[test_case(Delivered, Completed => true)]
    #[test_case(InProgress, Completed => false; "cannot complete undelivered")]
    #[test_case(InProgress, Cancelled => false; "in progress must dispute")]
    #[test_case(Delivered, Disputed => true)]
    #[test_case(Disputed, Completed => true)]
    #[test_case(Completed, Disputed => false)]
    fn test_transitions(from: OrderStatus, to: OrderStatus) -> bool {
        from.can_transition_to(to)
    }

    #[test]
    fn test_sources_of_cancelled() {
        assert_eq!(
            OrderStatus::sources_of(Cancelled),
            vec![Pending, Accepted, Disputed]
        );
    }

    #[test]
    fn test_revision_accounting() {
        let now = Utc::now();
        let mut order = ServiceOrder {
            revisions_allowed: 1,
            delivery_days: 2,
            ..ServiceOrder::default()
        };
        order.start(now);
        assert_eq!(order.due_at, Some(now + Duration::days(2)));
        order.deliver("v1".into(), now);
        assert_eq!(order.revisions_remaining(), 1);
        order.request_revision(now);
        assert_eq!(order.status, InProgress);
        assert_eq!(order.revisions_remaining(), 0);
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn test_party_of() {
        let order = ServiceOrder {
            buyer_id: 10,
            seller_id: 20,
            ..ServiceOrder::default()
        };
        assert_eq!(order.party_of(10), Some(OrderParty::Buyer));
        assert_eq!(order.party_of(20), Some(OrderParty::Seller));
        assert_eq!(order.party_of(30), None);
        assert_eq!(order.counterparty(20), Some(10));
    }
}
