//! Order Service
//!
//! Purchases of service packages and the buyer/seller order lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::application::events::{Notifier, RealtimeEvent};
use crate::application::services::escrow_service::{EscrowError, EscrowService, EscrowServiceImpl};
use crate::application::Actor;
use crate::domain::{
    Escrow, EscrowRepository, EscrowStatus, EscrowSubject, NotificationKind, OrderParty,
    OrderRepository, OrderStatus, PackageTier, ServiceOrder, ServiceRepository,
    SubjectTransition,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn place_order(
        &self,
        actor: Actor,
        service_id: i64,
        tier: PackageTier,
        requirements: String,
    ) -> Result<(ServiceOrder, Escrow), OrderError>;

    async fn get_order(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError>;

    async fn my_orders(
        &self,
        actor: Actor,
        party: OrderParty,
        page: PageRequest,
    ) -> Result<Page<ServiceOrder>, OrderError>;

    /// Seller accepts a PENDING order whose escrow is funded.
    async fn accept(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError>;

    async fn start(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError>;

    async fn deliver(
        &self,
        actor: Actor,
        order_id: i64,
        note: String,
    ) -> Result<ServiceOrder, OrderError>;

    async fn request_revision(&self, actor: Actor, order_id: i64)
        -> Result<ServiceOrder, OrderError>;

    /// Buyer accepts the delivery; the escrow is released.
    async fn complete(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError>;

    /// Either party cancels before work starts; the escrow is refunded.
    async fn cancel(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError>;

    async fn dispute(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError>;

    /// Complete DELIVERED orders older than `cutoff`. Returns how many were
    /// completed.
    async fn auto_complete_due(&self, cutoff: DateTime<Utc>, limit: i64)
        -> Result<usize, OrderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("This service is not available")]
    ServiceInactive,

    #[error("This service has no {0} package")]
    PackageNotFound(PackageTier),

    #[error("You cannot order your own service")]
    OwnService,

    #[error("Not a party to this order")]
    NotParty,

    #[error("Only the {0:?} can do this")]
    WrongParty(OrderParty),

    #[error("Order is {0}")]
    InvalidState(OrderStatus),

    #[error("The order's escrow must be funded first")]
    EscrowNotFunded,

    #[error("No revisions left on this order")]
    NoRevisionsLeft,

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound | OrderError::ServiceNotFound | OrderError::PackageNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            OrderError::OwnService | OrderError::NotParty | OrderError::WrongParty(_) => {
                AppError::Forbidden(err.to_string())
            }
            OrderError::ServiceInactive
            | OrderError::InvalidState(_)
            | OrderError::EscrowNotFunded
            | OrderError::NoRevisionsLeft => AppError::Conflict(err.to_string()),
            OrderError::Escrow(inner) => inner.into(),
            OrderError::Internal(inner) => inner,
        }
    }
}

pub struct OrderServiceImpl<O, S, E>
where
    O: OrderRepository,
    S: ServiceRepository,
    E: EscrowRepository,
{
    order_repo: Arc<O>,
    service_repo: Arc<S>,
    escrows: EscrowServiceImpl<E>,
    notifier: Notifier,
    id_generator: Arc<SnowflakeGenerator>,
    currency: String,
}

impl<O, S, E> OrderServiceImpl<O, S, E>
where
    O: OrderRepository,
    S: ServiceRepository,
    E: EscrowRepository + 'static,
{
    pub fn new(
        order_repo: Arc<O>,
        service_repo: Arc<S>,
        escrows: EscrowServiceImpl<E>,
        id_generator: Arc<SnowflakeGenerator>,
        currency: String,
    ) -> Self {
        let notifier = escrows.notifier().clone();
        Self {
            order_repo,
            service_repo,
            escrows,
            notifier,
            id_generator,
            currency,
        }
    }

    async fn load(&self, order_id: i64) -> Result<ServiceOrder, OrderError> {
        self.order_repo
            .find_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound)
    }

    /// Load the order and check the actor is on the `required` side.
    async fn load_as(
        &self,
        actor: Actor,
        order_id: i64,
        required: OrderParty,
    ) -> Result<ServiceOrder, OrderError> {
        let order = self.load(order_id).await?;
        match order.party_of(actor.user_id) {
            Some(party) if party == required => Ok(order),
            Some(_) => Err(OrderError::WrongParty(required)),
            None => Err(OrderError::NotParty),
        }
    }

    async fn load_escrow(&self, order_id: i64) -> Result<Escrow, OrderError> {
        self.escrows
            .repository()
            .find_by_order(order_id)
            .await?
            .ok_or_else(|| {
                OrderError::Internal(AppError::Internal(format!(
                    "order {} has no escrow",
                    order_id
                )))
            })
    }

    fn ensure_transition(order: &ServiceOrder, to: OrderStatus) -> Result<(), OrderError> {
        if order.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(OrderError::InvalidState(order.status))
        }
    }

    /// Persist `next` if the stored order is still in `from`.
    async fn save(
        &self,
        next: &ServiceOrder,
        from: &[OrderStatus],
    ) -> Result<ServiceOrder, OrderError> {
        match self.order_repo.save_transition(next, from).await? {
            Some(saved) => Ok(saved),
            None => {
                let current = self.load(next.id).await?;
                Err(OrderError::InvalidState(current.status))
            }
        }
    }

    async fn announce(&self, order: &ServiceOrder, actor_id: Option<i64>, message: &str) {
        metrics::record_marketplace_event(&format!("order_{}", order.status.as_str()));
        tracing::info!(order_id = order.id, status = %order.status, "Order updated");

        let recipients: Vec<i64> = [order.buyer_id, order.seller_id]
            .into_iter()
            .filter(|id| Some(*id) != actor_id)
            .collect();
        for user_id in &recipients {
            self.notifier
                .notify(
                    *user_id,
                    NotificationKind::OrderUpdate,
                    format!("Order {}", order.status.as_str().replace('_', " ")),
                    format!("\"{}\": {}", order.title, message),
                    Some(format!("/orders/{}", order.id)),
                )
                .await;
        }
        self.notifier
            .push(
                vec![order.buyer_id, order.seller_id],
                RealtimeEvent::OrderUpdate(order.clone()),
            )
            .await;
    }

    /// DELIVERED -> COMPLETED with escrow release, shared by buyer
    /// acceptance and the auto-complete job.
    async fn complete_delivered(&self, order: &ServiceOrder) -> Result<ServiceOrder, OrderError> {
        Self::ensure_transition(order, OrderStatus::Completed)?;
        if order.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidState(order.status));
        }

        let escrow = self.load_escrow(order.id).await?;
        self.escrows
            .release(
                &escrow,
                Some(SubjectTransition::Order {
                    id: order.id,
                    from: vec![OrderStatus::Delivered],
                    to: OrderStatus::Completed,
                }),
            )
            .await?;

        self.load(order.id).await
    }
}

#[async_trait]
impl<O, S, E> OrderService for OrderServiceImpl<O, S, E>
where
    O: OrderRepository + 'static,
    S: ServiceRepository + 'static,
    E: EscrowRepository + 'static,
{
    async fn place_order(
        &self,
        actor: Actor,
        service_id: i64,
        tier: PackageTier,
        requirements: String,
    ) -> Result<(ServiceOrder, Escrow), OrderError> {
        let service = self
            .service_repo
            .find_by_id(service_id)
            .await?
            .ok_or(OrderError::ServiceNotFound)?;
        if service.freelancer_id == actor.user_id {
            return Err(OrderError::OwnService);
        }
        if !service.is_active {
            return Err(OrderError::ServiceInactive);
        }
        let package = service
            .package(tier)
            .ok_or(OrderError::PackageNotFound(tier))?;

        let now = Utc::now();
        let order = ServiceOrder {
            id: self.id_generator.generate(),
            service_id,
            package_tier: tier,
            buyer_id: actor.user_id,
            seller_id: service.freelancer_id,
            title: format!("{} ({})", service.title, package.title),
            price_cents: package.price_cents,
            delivery_days: package.delivery_days,
            revisions_allowed: package.revisions,
            revisions_used: 0,
            requirements,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            ..ServiceOrder::default()
        };
        let escrow = Escrow::pending(
            self.id_generator.generate(),
            EscrowSubject::Order(order.id),
            order.buyer_id,
            order.seller_id,
            order.price_cents,
            &self.currency,
        );

        let created = self.order_repo.create_with_escrow(&order, &escrow).await?;
        tracing::info!(
            order_id = created.id,
            service_id,
            escrow_id = escrow.id,
            "Order placed"
        );
        self.announce(&created, Some(actor.user_id), "new order received")
            .await;

        Ok((created, escrow))
    }

    async fn get_order(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError> {
        let order = self.load(order_id).await?;
        if order.party_of(actor.user_id).is_none() && !actor.is_admin() {
            return Err(OrderError::NotParty);
        }
        Ok(order)
    }

    async fn my_orders(
        &self,
        actor: Actor,
        party: OrderParty,
        page: PageRequest,
    ) -> Result<Page<ServiceOrder>, OrderError> {
        let (items, total) = self
            .order_repo
            .list_for_user(actor.user_id, party, page)
            .await?;
        Ok(Page::new(items, page, total))
    }

    async fn accept(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError> {
        let order = self.load_as(actor, order_id, OrderParty::Seller).await?;
        Self::ensure_transition(&order, OrderStatus::Accepted)?;

        let escrow = self.load_escrow(order_id).await?;
        if escrow.status != EscrowStatus::Funded {
            return Err(OrderError::EscrowNotFunded);
        }

        let mut next = order.clone();
        next.status = OrderStatus::Accepted;
        next.updated_at = Utc::now();
        let saved = self.save(&next, &[OrderStatus::Pending]).await?;

        self.announce(&saved, Some(actor.user_id), "the seller accepted your order")
            .await;
        Ok(saved)
    }

    async fn start(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError> {
        let order = self.load_as(actor, order_id, OrderParty::Seller).await?;
        Self::ensure_transition(&order, OrderStatus::InProgress)?;
        if order.status != OrderStatus::Accepted {
            return Err(OrderError::InvalidState(order.status));
        }

        let mut next = order.clone();
        next.start(Utc::now());
        let saved = self.save(&next, &[OrderStatus::Accepted]).await?;

        self.announce(&saved, Some(actor.user_id), "work has started").await;
        Ok(saved)
    }

    async fn deliver(
        &self,
        actor: Actor,
        order_id: i64,
        note: String,
    ) -> Result<ServiceOrder, OrderError> {
        let order = self.load_as(actor, order_id, OrderParty::Seller).await?;
        Self::ensure_transition(&order, OrderStatus::Delivered)?;

        let mut next = order.clone();
        next.deliver(note, Utc::now());
        let saved = self.save(&next, &[OrderStatus::InProgress]).await?;

        self.announce(&saved, Some(actor.user_id), "the seller delivered your order")
            .await;
        Ok(saved)
    }

    async fn request_revision(
        &self,
        actor: Actor,
        order_id: i64,
    ) -> Result<ServiceOrder, OrderError> {
        let order = self.load_as(actor, order_id, OrderParty::Buyer).await?;
        if order.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidState(order.status));
        }
        if order.revisions_remaining() == 0 {
            return Err(OrderError::NoRevisionsLeft);
        }

        let mut next = order.clone();
        next.request_revision(Utc::now());
        let saved = self.save(&next, &[OrderStatus::Delivered]).await?;

        self.announce(&saved, Some(actor.user_id), "the buyer requested a revision")
            .await;
        Ok(saved)
    }

    async fn complete(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError> {
        let order = self.load_as(actor, order_id, OrderParty::Buyer).await?;
        let completed = self.complete_delivered(&order).await?;
        self.announce(&completed, Some(actor.user_id), "the buyer accepted the delivery")
            .await;
        Ok(completed)
    }

    async fn cancel(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError> {
        let order = self.load(order_id).await?;
        if order.party_of(actor.user_id).is_none() {
            return Err(OrderError::NotParty);
        }
        // Disputed orders are cancelled through admin resolution
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Accepted) {
            return Err(OrderError::InvalidState(order.status));
        }

        let escrow = self.load_escrow(order_id).await?;
        self.escrows
            .refund(
                &escrow,
                Some(SubjectTransition::Order {
                    id: order_id,
                    from: vec![OrderStatus::Pending, OrderStatus::Accepted],
                    to: OrderStatus::Cancelled,
                }),
            )
            .await?;

        let cancelled = self.load(order_id).await?;
        self.announce(&cancelled, Some(actor.user_id), "the order was cancelled")
            .await;
        Ok(cancelled)
    }

    async fn dispute(&self, actor: Actor, order_id: i64) -> Result<ServiceOrder, OrderError> {
        let order = self.load(order_id).await?;
        if order.party_of(actor.user_id).is_none() {
            return Err(OrderError::NotParty);
        }
        Self::ensure_transition(&order, OrderStatus::Disputed)?;

        let mut next = order.clone();
        next.status = OrderStatus::Disputed;
        next.updated_at = Utc::now();
        let saved = self
            .save(&next, &[OrderStatus::InProgress, OrderStatus::Delivered])
            .await?;

        tracing::warn!(order_id, opened_by = actor.user_id, "Order disputed");
        self.announce(&saved, Some(actor.user_id), "a dispute was opened").await;
        Ok(saved)
    }

    async fn auto_complete_due(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize, OrderError> {
        let due = self.order_repo.find_auto_completable(cutoff, limit).await?;
        let mut completed = 0;
        for order in due {
            match self.complete_delivered(&order).await {
                Ok(done) => {
                    completed += 1;
                    self.announce(&done, None, "completed automatically after the review period")
                        .await;
                }
                Err(e) => {
                    // A buyer action or dispute may have raced the sweep
                    tracing::warn!(order_id = order.id, error = %e, "Auto-complete skipped");
                }
            }
        }
        Ok(completed)
    }
}

/// Delivered-before cutoff for the auto-complete sweep.
pub fn auto_complete_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::test_support::silent_notifier;
    use crate::application::payments::{MockPaymentProvider, ProviderReference};
    use crate::domain::{
        FeePolicy, ListingTier, MockEscrowRepository, MockOrderRepository,
        MockServiceRepository, ServiceListing, ServicePackage, UserRole,
    };

    const BUYER: i64 = 1;
    const SELLER: i64 = 2;

    type Svc = OrderServiceImpl<MockOrderRepository, MockServiceRepository, MockEscrowRepository>;

    fn service(
        orders: MockOrderRepository,
        services: MockServiceRepository,
        escrows: MockEscrowRepository,
    ) -> Svc {
        service_with_payments(orders, services, escrows, MockPaymentProvider::new())
    }

    fn service_with_payments(
        orders: MockOrderRepository,
        services: MockServiceRepository,
        escrows: MockEscrowRepository,
        payments: MockPaymentProvider,
    ) -> Svc {
        let ids = Arc::new(SnowflakeGenerator::new(1, 1));
        let escrow_service = EscrowServiceImpl::new(
            Arc::new(escrows),
            Arc::new(payments),
            silent_notifier(),
            ids.clone(),
            FeePolicy::new(1000),
        );
        OrderServiceImpl::new(
            Arc::new(orders),
            Arc::new(services),
            escrow_service,
            ids,
            "usd".into(),
        )
    }

    fn order(status: OrderStatus) -> ServiceOrder {
        ServiceOrder {
            id: 40,
            buyer_id: BUYER,
            seller_id: SELLER,
            price_cents: 8000,
            revisions_allowed: 1,
            status,
            ..ServiceOrder::default()
        }
    }

    fn escrow(status: EscrowStatus) -> Escrow {
        let mut e = Escrow::pending(70, EscrowSubject::Order(40), BUYER, SELLER, 8000, "usd");
        e.status = status;
        e.payment_intent_id = Some("pi_9".into());
        e
    }

    fn listing() -> ServiceListing {
        ServiceListing {
            id: 8,
            freelancer_id: SELLER,
            title: "Logo".into(),
            description: String::new(),
            category: "design".into(),
            tags: vec![],
            is_active: true,
            tier: ListingTier::Standard,
            packages: vec![ServicePackage {
                tier: PackageTier::Basic,
                title: "Basic".into(),
                description: String::new(),
                price_cents: 8000,
                delivery_days: 4,
                revisions: 2,
                features: vec![],
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn buyer() -> Actor {
        Actor::new(BUYER, UserRole::Client)
    }

    fn seller() -> Actor {
        Actor::new(SELLER, UserRole::Freelancer)
    }

    #[tokio::test]
    async fn test_place_order_snapshots_package() {
        let mut services = MockServiceRepository::new();
        services.expect_find_by_id().returning(|_| Ok(Some(listing())));
        let mut orders = MockOrderRepository::new();
        orders
            .expect_create_with_escrow()
            .withf(|order, escrow| {
                order.price_cents == 8000
                    && order.delivery_days == 4
                    && order.revisions_allowed == 2
                    && order.status == OrderStatus::Pending
                    && escrow.order_id == Some(order.id)
                    && escrow.amount_cents == 8000
                    && escrow.status == EscrowStatus::Pending
            })
            .returning(|order, _| Ok(order.clone()));

        let svc = service(orders, services, MockEscrowRepository::new());
        let (order, escrow) = svc
            .place_order(buyer(), 8, PackageTier::Basic, "A fox logo".into())
            .await
            .unwrap();
        assert_eq!(order.seller_id, SELLER);
        assert_eq!(escrow.client_id, BUYER);
    }

    #[tokio::test]
    async fn test_cannot_order_own_service() {
        let mut services = MockServiceRepository::new();
        services.expect_find_by_id().returning(|_| Ok(Some(listing())));
        let svc = service(MockOrderRepository::new(), services, MockEscrowRepository::new());
        let err = svc
            .place_order(seller(), 8, PackageTier::Basic, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OwnService));
    }

    #[tokio::test]
    async fn test_missing_package_tier() {
        let mut services = MockServiceRepository::new();
        services.expect_find_by_id().returning(|_| Ok(Some(listing())));
        let svc = service(MockOrderRepository::new(), services, MockEscrowRepository::new());
        let err = svc
            .place_order(buyer(), 8, PackageTier::Premium, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PackageNotFound(PackageTier::Premium)));
    }

    #[tokio::test]
    async fn test_accept_requires_funded_escrow() {
        let mut orders = MockOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(order(OrderStatus::Pending))));
        let mut escrows = MockEscrowRepository::new();
        escrows
            .expect_find_by_order()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Pending))));

        let svc = service(orders, MockServiceRepository::new(), escrows);
        let err = svc.accept(seller(), 40).await.unwrap_err();
        assert!(matches!(err, OrderError::EscrowNotFunded));
    }

    #[tokio::test]
    async fn test_buyer_cannot_deliver() {
        let mut orders = MockOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(order(OrderStatus::InProgress))));
        let svc = service(orders, MockServiceRepository::new(), MockEscrowRepository::new());
        let err = svc.deliver(buyer(), 40, "done".into()).await.unwrap_err();
        assert!(matches!(err, OrderError::WrongParty(OrderParty::Seller)));
    }

    #[tokio::test]
    async fn test_revision_limit() {
        let mut orders = MockOrderRepository::new();
        orders.expect_find_by_id().returning(|_| {
            let mut o = order(OrderStatus::Delivered);
            o.revisions_used = 1;
            Ok(Some(o))
        });
        let svc = service(orders, MockServiceRepository::new(), MockEscrowRepository::new());
        let err = svc.request_revision(buyer(), 40).await.unwrap_err();
        assert!(matches!(err, OrderError::NoRevisionsLeft));
    }

    #[tokio::test]
    async fn test_revision_moves_back_to_in_progress() {
        let mut orders = MockOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(order(OrderStatus::Delivered))));
        orders
            .expect_save_transition()
            .withf(|next, from| {
                next.status == OrderStatus::InProgress
                    && next.revisions_used == 1
                    && from == [OrderStatus::Delivered]
            })
            .returning(|next, _| Ok(Some(next.clone())));
        let svc = service(orders, MockServiceRepository::new(), MockEscrowRepository::new());
        let saved = svc.request_revision(buyer(), 40).await.unwrap();
        assert_eq!(saved.revisions_remaining(), 0);
    }

    #[tokio::test]
    async fn test_complete_releases_escrow() {
        let mut orders = MockOrderRepository::new();
        let mut seq = mockall::Sequence::new();
        orders
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(order(OrderStatus::Delivered))));
        orders
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(order(OrderStatus::Completed))));
        let mut escrows = MockEscrowRepository::new();
        escrows
            .expect_find_by_order()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Funded))));
        escrows
            .expect_release()
            .withf(|_, fee, _, subject| {
                *fee == 800
                    && matches!(
                        subject,
                        Some(SubjectTransition::Order { id: 40, to: OrderStatus::Completed, .. })
                    )
            })
            .times(1)
            .returning(|_, _, _, _| Ok(Some(escrow(EscrowStatus::Released))));

        let svc = service(orders, MockServiceRepository::new(), escrows);
        let done = svc.complete(buyer(), 40).await.unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_in_progress_is_rejected() {
        let mut orders = MockOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(order(OrderStatus::InProgress))));
        let svc = service(orders, MockServiceRepository::new(), MockEscrowRepository::new());
        let err = svc.cancel(buyer(), 40).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidState(OrderStatus::InProgress)));
    }

    #[tokio::test]
    async fn test_cancel_accepted_order_refunds_funded_escrow() {
        let mut orders = MockOrderRepository::new();
        let mut seq = mockall::Sequence::new();
        orders
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(order(OrderStatus::Accepted))));
        orders
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(order(OrderStatus::Cancelled))));
        let mut escrows = MockEscrowRepository::new();
        escrows
            .expect_find_by_order()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Funded))));
        escrows
            .expect_refund()
            .withf(|id, from, entries, subject| {
                *id == 70
                    && *from == EscrowStatus::Funded
                    && entries.len() == 1
                    && entries[0].user_id == BUYER
                    && entries[0].amount_cents == 8000
                    && *subject
                        == Some(SubjectTransition::Order {
                            id: 40,
                            from: vec![OrderStatus::Pending, OrderStatus::Accepted],
                            to: OrderStatus::Cancelled,
                        })
            })
            .times(1)
            .returning(|_, _, _, _| Ok(Some(escrow(EscrowStatus::Refunded))));
        escrows
            .expect_record_provider_refund()
            .times(1)
            .returning(|_, _| Ok(Some(escrow(EscrowStatus::Refunded))));
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_refund()
            .withf(|intent| intent == "pi_9")
            .times(1)
            .returning(|_| Ok(ProviderReference { id: "re_9".into() }));

        let svc = service_with_payments(orders, MockServiceRepository::new(), escrows, payments);
        let cancelled = svc.cancel(seller(), 40).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_racing_seller_start_keeps_money_held() {
        let mut orders = MockOrderRepository::new();
        orders
            .expect_find_by_id()
            .returning(|_| Ok(Some(order(OrderStatus::Accepted))));
        let mut escrows = MockEscrowRepository::new();
        escrows
            .expect_find_by_order()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Funded))));
        // The seller started work, so the order is no longer cancellable
        escrows.expect_refund().returning(|_, _, _, _| Ok(None));
        let mut payments = MockPaymentProvider::new();
        payments.expect_refund().never();

        let svc = service_with_payments(orders, MockServiceRepository::new(), escrows, payments);
        let err = svc.cancel(buyer(), 40).await.unwrap_err();
        assert!(matches!(err, OrderError::Escrow(EscrowError::Conflict)));
    }

    #[tokio::test]
    async fn test_auto_complete_skips_races() {
        let mut orders = MockOrderRepository::new();
        orders
            .expect_find_auto_completable()
            .returning(|_, _| Ok(vec![order(OrderStatus::Delivered)]));
        let mut escrows = MockEscrowRepository::new();
        escrows
            .expect_find_by_order()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Funded))));
        // Buyer disputed in the meantime, so the conditional update loses
        escrows.expect_release().returning(|_, _, _, _| Ok(None));

        let svc = service(orders, MockServiceRepository::new(), escrows);
        let n = svc.auto_complete_due(Utc::now(), 50).await.unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        assert_eq!(auto_complete_cutoff(now, 3), now - Duration::days(3));
    }
}
