//! Payout Service
//!
//! Freelancer wallet, payout requests, and admin payout processing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::application::audit::Auditor;
use crate::application::events::Notifier;
use crate::application::payments::{PaymentError, PaymentProvider, TransferRequest};
use crate::application::Actor;
use crate::domain::{
    format_cents, AdminAction, Cents, NotificationKind, Payout, PayoutMethod, PayoutRepository,
    PayoutRequestOutcome, PayoutStatus, PayoutUpdate, Transaction, TransactionKind,
    TransactionRepository,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait PayoutService: Send + Sync {
    async fn wallet(&self, actor: Actor, page: PageRequest) -> Result<Wallet, PayoutError>;

    async fn request_payout(
        &self,
        actor: Actor,
        input: PayoutInput,
    ) -> Result<Payout, PayoutError>;

    async fn my_payouts(&self, actor: Actor, page: PageRequest)
        -> Result<Page<Payout>, PayoutError>;

    async fn list_payouts(
        &self,
        status: Option<PayoutStatus>,
        page: PageRequest,
    ) -> Result<Page<Payout>, PayoutError>;

    /// PENDING -> PROCESSING. Automated methods are transferred right away:
    /// COMPLETED on success, FAILED when the provider rejects the transfer,
    /// still PROCESSING when the provider could not be reached. Processing an
    /// automated payout that is already PROCESSING retries its transfer.
    async fn process(&self, admin: Actor, payout_id: i64) -> Result<Payout, PayoutError>;

    /// PROCESSING -> COMPLETED for payouts settled outside the platform.
    async fn complete(
        &self,
        admin: Actor,
        payout_id: i64,
        reference: Option<String>,
    ) -> Result<Payout, PayoutError>;

    /// PENDING/PROCESSING -> FAILED; the amount is credited back.
    async fn fail(&self, admin: Actor, payout_id: i64, reason: String)
        -> Result<Payout, PayoutError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub available_cents: Cents,
    pub currency: String,
    pub transactions: Page<Transaction>,
}

#[derive(Debug, Clone)]
pub struct PayoutInput {
    pub amount_cents: Cents,
    pub method: PayoutMethod,
    pub destination: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Payout not found")]
    NotFound,

    #[error("Only freelancers can request payouts")]
    FreelancersOnly,

    #[error("Minimum payout is {0}")]
    BelowMinimum(String),

    #[error("Insufficient balance: {0} available")]
    InsufficientBalance(String),

    #[error("Payout is {0}")]
    InvalidState(PayoutStatus),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        match err {
            PayoutError::NotFound => AppError::NotFound(err.to_string()),
            PayoutError::FreelancersOnly => AppError::Forbidden(err.to_string()),
            PayoutError::BelowMinimum(_) => AppError::Validation(err.to_string()),
            PayoutError::InsufficientBalance(_) | PayoutError::InvalidState(_) => {
                AppError::Conflict(err.to_string())
            }
            PayoutError::Internal(inner) => inner,
        }
    }
}

pub struct PayoutServiceImpl<P, T>
where
    P: PayoutRepository,
    T: TransactionRepository,
{
    payout_repo: Arc<P>,
    transaction_repo: Arc<T>,
    payments: Arc<dyn PaymentProvider>,
    notifier: Notifier,
    auditor: Auditor,
    id_generator: Arc<SnowflakeGenerator>,
    currency: String,
    min_payout_cents: Cents,
}

impl<P, T> PayoutServiceImpl<P, T>
where
    P: PayoutRepository,
    T: TransactionRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payout_repo: Arc<P>,
        transaction_repo: Arc<T>,
        payments: Arc<dyn PaymentProvider>,
        notifier: Notifier,
        auditor: Auditor,
        id_generator: Arc<SnowflakeGenerator>,
        currency: String,
        min_payout_cents: Cents,
    ) -> Self {
        Self {
            payout_repo,
            transaction_repo,
            payments,
            notifier,
            auditor,
            id_generator,
            currency,
            min_payout_cents,
        }
    }

    async fn load(&self, payout_id: i64) -> Result<Payout, PayoutError> {
        self.payout_repo
            .find_by_id(payout_id)
            .await?
            .ok_or(PayoutError::NotFound)
    }

    async fn state_error(&self, payout_id: i64) -> PayoutError {
        match self.load(payout_id).await {
            Ok(current) => PayoutError::InvalidState(current.status),
            Err(e) => e,
        }
    }

    async fn transition(
        &self,
        payout: &Payout,
        to: PayoutStatus,
        update: PayoutUpdate,
    ) -> Result<Payout, PayoutError> {
        if !payout.status.can_transition_to(to) {
            return Err(PayoutError::InvalidState(payout.status));
        }
        match self
            .payout_repo
            .transition(payout.id, &[payout.status], to, &update)
            .await?
        {
            Some(updated) => Ok(updated),
            None => Err(self.state_error(payout.id).await),
        }
    }

    async fn mark_failed(
        &self,
        payout: &Payout,
        admin_id: i64,
        reason: String,
    ) -> Result<Payout, PayoutError> {
        if !payout.status.can_transition_to(PayoutStatus::Failed) {
            return Err(PayoutError::InvalidState(payout.status));
        }
        let reversal = Transaction::new(
            self.id_generator.generate(),
            payout.freelancer_id,
            TransactionKind::Reversal,
            payout.amount_cents,
            &payout.currency,
            format!("Payout {} failed", payout.id),
        )
        .for_payout(payout.id);
        let update = PayoutUpdate {
            failure_reason: Some(reason.clone()),
            processed_by: Some(admin_id),
            ..PayoutUpdate::default()
        };

        let failed = match self
            .payout_repo
            .fail(payout.id, &[payout.status], &update, &reversal)
            .await?
        {
            Some(failed) => failed,
            None => return Err(self.state_error(payout.id).await),
        };

        metrics::record_marketplace_event("payout_failed");
        tracing::warn!(payout_id = failed.id, reason = %reason, "Payout failed");
        self.notifier
            .notify(
                failed.freelancer_id,
                NotificationKind::PayoutUpdate,
                "Payout failed",
                format!(
                    "Your payout of {} failed and was returned to your balance: {}",
                    format_cents(failed.amount_cents, &failed.currency),
                    reason
                ),
                Some("/wallet".to_string()),
            )
            .await;
        self.auditor
            .record(
                admin_id,
                AdminAction::PayoutFailed,
                "payout",
                failed.id,
                json!({ "reason": reason }),
            )
            .await;
        Ok(failed)
    }

    async fn announce_completed(&self, payout: &Payout, admin_id: i64) {
        metrics::record_marketplace_event("payout_completed");
        tracing::info!(payout_id = payout.id, "Payout completed");
        self.notifier
            .notify(
                payout.freelancer_id,
                NotificationKind::PayoutUpdate,
                "Payout sent",
                format!(
                    "{} was sent to your {} account.",
                    format_cents(payout.amount_cents, &payout.currency),
                    payout.method.as_str().replace('_', " ")
                ),
                Some("/wallet".to_string()),
            )
            .await;
        self.auditor
            .record(
                admin_id,
                AdminAction::PayoutCompleted,
                "payout",
                payout.id,
                json!({ "reference": payout.provider_reference }),
            )
            .await;
    }
}

#[async_trait]
impl<P, T> PayoutService for PayoutServiceImpl<P, T>
where
    P: PayoutRepository + 'static,
    T: TransactionRepository + 'static,
{
    async fn wallet(&self, actor: Actor, page: PageRequest) -> Result<Wallet, PayoutError> {
        let available_cents = self.transaction_repo.available_balance(actor.user_id).await?;
        let (items, total) = self
            .transaction_repo
            .list_for_user(actor.user_id, page)
            .await?;
        Ok(Wallet {
            available_cents,
            currency: self.currency.clone(),
            transactions: Page::new(items, page, total),
        })
    }

    async fn request_payout(
        &self,
        actor: Actor,
        input: PayoutInput,
    ) -> Result<Payout, PayoutError> {
        if !actor.is_freelancer() {
            return Err(PayoutError::FreelancersOnly);
        }
        if input.amount_cents < self.min_payout_cents {
            return Err(PayoutError::BelowMinimum(format_cents(
                self.min_payout_cents,
                &self.currency,
            )));
        }

        let now = Utc::now();
        let payout = Payout {
            id: self.id_generator.generate(),
            freelancer_id: actor.user_id,
            amount_cents: input.amount_cents,
            currency: self.currency.clone(),
            method: input.method,
            destination: input.destination.trim().to_string(),
            status: PayoutStatus::Pending,
            provider_reference: None,
            failure_reason: None,
            processed_by: None,
            created_at: now,
            updated_at: now,
        };
        let withdrawal = Transaction::new(
            self.id_generator.generate(),
            actor.user_id,
            TransactionKind::Withdrawal,
            payout.amount_cents,
            &payout.currency,
            format!("Payout {} requested", payout.id),
        )
        .for_payout(payout.id);

        match self
            .payout_repo
            .create_with_withdrawal(&payout, &withdrawal)
            .await?
        {
            PayoutRequestOutcome::Created(created) => {
                metrics::record_marketplace_event("payout_requested");
                tracing::info!(
                    payout_id = created.id,
                    user_id = actor.user_id,
                    amount_cents = created.amount_cents,
                    "Payout requested"
                );
                Ok(created)
            }
            PayoutRequestOutcome::InsufficientBalance { available } => Err(
                PayoutError::InsufficientBalance(format_cents(available, &self.currency)),
            ),
        }
    }

    async fn my_payouts(
        &self,
        actor: Actor,
        page: PageRequest,
    ) -> Result<Page<Payout>, PayoutError> {
        let (items, total) = self
            .payout_repo
            .list_for_freelancer(actor.user_id, page)
            .await?;
        Ok(Page::new(items, page, total))
    }

    async fn list_payouts(
        &self,
        status: Option<PayoutStatus>,
        page: PageRequest,
    ) -> Result<Page<Payout>, PayoutError> {
        let (items, total) = self.payout_repo.list(status, page).await?;
        Ok(Page::new(items, page, total))
    }

    async fn process(&self, admin: Actor, payout_id: i64) -> Result<Payout, PayoutError> {
        let payout = self.load(payout_id).await?;
        let retrying = payout.status == PayoutStatus::Processing && payout.method.is_automated();
        let processing = if retrying {
            tracing::info!(payout_id, "Retrying payout transfer");
            payout
        } else {
            self.transition(
                &payout,
                PayoutStatus::Processing,
                PayoutUpdate {
                    processed_by: Some(admin.user_id),
                    ..PayoutUpdate::default()
                },
            )
            .await?
        };
        self.auditor
            .record(
                admin.user_id,
                AdminAction::PayoutProcessed,
                "payout",
                processing.id,
                json!({ "method": processing.method, "retry": retrying }),
            )
            .await;

        if !processing.method.is_automated() {
            return Ok(processing);
        }

        // The idempotency key is the payout id, so a retry cannot pay twice
        let transfer = self
            .payments
            .transfer(&TransferRequest {
                payout_id: processing.id,
                amount_cents: processing.amount_cents,
                currency: processing.currency.clone(),
                destination: processing.destination.clone(),
            })
            .await;

        match transfer {
            Ok(reference) => {
                let completed = self
                    .transition(
                        &processing,
                        PayoutStatus::Completed,
                        PayoutUpdate {
                            provider_reference: Some(reference.id),
                            processed_by: Some(admin.user_id),
                            ..PayoutUpdate::default()
                        },
                    )
                    .await?;
                self.announce_completed(&completed, admin.user_id).await;
                Ok(completed)
            }
            // The transfer may have gone through; only a rejection is final
            Err(PaymentError::Unavailable(reason)) => {
                tracing::warn!(payout_id, reason = %reason, "Transfer outcome unknown; payout stays processing");
                Ok(processing)
            }
            Err(e) => {
                self.mark_failed(&processing, admin.user_id, e.to_string())
                    .await
            }
        }
    }

    async fn complete(
        &self,
        admin: Actor,
        payout_id: i64,
        reference: Option<String>,
    ) -> Result<Payout, PayoutError> {
        let payout = self.load(payout_id).await?;
        let completed = self
            .transition(
                &payout,
                PayoutStatus::Completed,
                PayoutUpdate {
                    provider_reference: reference,
                    processed_by: Some(admin.user_id),
                    ..PayoutUpdate::default()
                },
            )
            .await?;
        self.announce_completed(&completed, admin.user_id).await;
        Ok(completed)
    }

    async fn fail(
        &self,
        admin: Actor,
        payout_id: i64,
        reason: String,
    ) -> Result<Payout, PayoutError> {
        let payout = self.load(payout_id).await?;
        self.mark_failed(&payout, admin.user_id, reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit::test_support::silent_auditor;
    use crate::application::events::test_support::silent_notifier;
    use crate::application::payments::{MockPaymentProvider, ProviderReference};
    use crate::domain::{MockPayoutRepository, MockTransactionRepository, UserRole};

    const FREELANCER: i64 = 4;
    const ADMIN: i64 = 1;

    fn service(
        payouts: MockPayoutRepository,
        payments: MockPaymentProvider,
    ) -> PayoutServiceImpl<MockPayoutRepository, MockTransactionRepository> {
        PayoutServiceImpl::new(
            Arc::new(payouts),
            Arc::new(MockTransactionRepository::new()),
            Arc::new(payments),
            silent_notifier(),
            silent_auditor(),
            Arc::new(SnowflakeGenerator::new(1, 1)),
            "usd".into(),
            2000,
        )
    }

    fn payout(status: PayoutStatus, method: PayoutMethod) -> Payout {
        Payout {
            id: 30,
            freelancer_id: FREELANCER,
            amount_cents: 5000,
            currency: "usd".into(),
            method,
            destination: "acct_123".into(),
            status,
            provider_reference: None,
            failure_reason: None,
            processed_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn input(amount: Cents) -> PayoutInput {
        PayoutInput {
            amount_cents: amount,
            method: PayoutMethod::Paypal,
            destination: "me@example.com".into(),
        }
    }

    fn freelancer() -> Actor {
        Actor::new(FREELANCER, UserRole::Freelancer)
    }

    fn admin() -> Actor {
        Actor::new(ADMIN, UserRole::Admin)
    }

    #[tokio::test]
    async fn test_minimum_payout() {
        let svc = service(MockPayoutRepository::new(), MockPaymentProvider::new());
        let err = svc.request_payout(freelancer(), input(1999)).await.unwrap_err();
        assert!(matches!(err, PayoutError::BelowMinimum(_)));
        assert_eq!(err.to_string(), "Minimum payout is 20.00 USD");
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let mut payouts = MockPayoutRepository::new();
        payouts
            .expect_create_with_withdrawal()
            .returning(|_, _| Ok(PayoutRequestOutcome::InsufficientBalance { available: 1500 }));
        let svc = service(payouts, MockPaymentProvider::new());
        let err = svc.request_payout(freelancer(), input(5000)).await.unwrap_err();
        assert!(matches!(err, PayoutError::InsufficientBalance(_)));
    }

    #[tokio::test]
    async fn test_request_records_withdrawal() {
        let mut payouts = MockPayoutRepository::new();
        payouts
            .expect_create_with_withdrawal()
            .withf(|payout, withdrawal| {
                withdrawal.kind == TransactionKind::Withdrawal
                    && withdrawal.amount_cents == payout.amount_cents
                    && withdrawal.payout_id == Some(payout.id)
            })
            .returning(|payout, _| Ok(PayoutRequestOutcome::Created(payout.clone())));
        let svc = service(payouts, MockPaymentProvider::new());
        let created = svc.request_payout(freelancer(), input(5000)).await.unwrap();
        assert_eq!(created.status, PayoutStatus::Pending);
    }

    #[tokio::test]
    async fn test_clients_cannot_request() {
        let svc = service(MockPayoutRepository::new(), MockPaymentProvider::new());
        let err = svc
            .request_payout(Actor::new(9, UserRole::Client), input(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, PayoutError::FreelancersOnly));
    }

    #[tokio::test]
    async fn test_manual_method_stops_at_processing() {
        let mut payouts = MockPayoutRepository::new();
        payouts
            .expect_find_by_id()
            .returning(|_| Ok(Some(payout(PayoutStatus::Pending, PayoutMethod::Paypal))));
        payouts
            .expect_transition()
            .returning(|_, _, to, _| Ok(Some(payout(to, PayoutMethod::Paypal))));
        let mut payments = MockPaymentProvider::new();
        payments.expect_transfer().never();

        let svc = service(payouts, payments);
        let processed = svc.process(admin(), 30).await.unwrap();
        assert_eq!(processed.status, PayoutStatus::Processing);
    }

    #[tokio::test]
    async fn test_stripe_connect_transfer_completes() {
        let mut payouts = MockPayoutRepository::new();
        payouts.expect_find_by_id().returning(|_| {
            Ok(Some(payout(PayoutStatus::Pending, PayoutMethod::StripeConnect)))
        });
        payouts.expect_transition().returning(|_, _, to, update| {
            let mut p = payout(to, PayoutMethod::StripeConnect);
            p.provider_reference = update.provider_reference.clone();
            Ok(Some(p))
        });
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_transfer()
            .times(1)
            .returning(|_| Ok(ProviderReference { id: "tr_1".into() }));

        let svc = service(payouts, payments);
        let done = svc.process(admin(), 30).await.unwrap();
        assert_eq!(done.status, PayoutStatus::Completed);
        assert_eq!(done.provider_reference.as_deref(), Some("tr_1"));
    }

    #[tokio::test]
    async fn test_failed_transfer_reverses_funds() {
        let mut payouts = MockPayoutRepository::new();
        payouts.expect_find_by_id().returning(|_| {
            Ok(Some(payout(PayoutStatus::Pending, PayoutMethod::StripeConnect)))
        });
        payouts
            .expect_transition()
            .returning(|_, _, to, _| Ok(Some(payout(to, PayoutMethod::StripeConnect))));
        payouts
            .expect_fail()
            .withf(|_, from, _, reversal| {
                from == [PayoutStatus::Processing]
                    && reversal.kind == TransactionKind::Reversal
                    && reversal.amount_cents == 5000
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(Some(payout(PayoutStatus::Failed, PayoutMethod::StripeConnect)))
            });
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_transfer()
            .returning(|_| Err(PaymentError::Rejected("no such destination".into())));

        let svc = service(payouts, payments);
        let failed = svc.process(admin(), 30).await.unwrap();
        assert_eq!(failed.status, PayoutStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreachable_provider_leaves_payout_processing() {
        let mut payouts = MockPayoutRepository::new();
        payouts.expect_find_by_id().returning(|_| {
            Ok(Some(payout(PayoutStatus::Pending, PayoutMethod::StripeConnect)))
        });
        payouts
            .expect_transition()
            .times(1)
            .returning(|_, _, to, _| Ok(Some(payout(to, PayoutMethod::StripeConnect))));
        payouts.expect_fail().never();
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_transfer()
            .returning(|_| Err(PaymentError::Unavailable("operation timed out".into())));

        let svc = service(payouts, payments);
        let pending = svc.process(admin(), 30).await.unwrap();
        assert_eq!(pending.status, PayoutStatus::Processing);
    }

    #[tokio::test]
    async fn test_processing_again_retries_transfer() {
        let mut payouts = MockPayoutRepository::new();
        payouts.expect_find_by_id().returning(|_| {
            Ok(Some(payout(PayoutStatus::Processing, PayoutMethod::StripeConnect)))
        });
        payouts
            .expect_transition()
            .withf(|_, from, to, _| {
                *from == [PayoutStatus::Processing] && *to == PayoutStatus::Completed
            })
            .times(1)
            .returning(|_, _, to, update| {
                let mut p = payout(to, PayoutMethod::StripeConnect);
                p.provider_reference = update.provider_reference.clone();
                Ok(Some(p))
            });
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_transfer()
            .withf(|req| req.payout_id == 30)
            .times(1)
            .returning(|_| Ok(ProviderReference { id: "tr_retry".into() }));

        let svc = service(payouts, payments);
        let done = svc.process(admin(), 30).await.unwrap();
        assert_eq!(done.provider_reference.as_deref(), Some("tr_retry"));
    }

    #[tokio::test]
    async fn test_completed_payout_cannot_fail() {
        let mut payouts = MockPayoutRepository::new();
        payouts
            .expect_find_by_id()
            .returning(|_| Ok(Some(payout(PayoutStatus::Completed, PayoutMethod::Paypal))));
        let svc = service(payouts, MockPaymentProvider::new());
        let err = svc.fail(admin(), 30, "oops".into()).await.unwrap_err();
        assert!(matches!(err, PayoutError::InvalidState(PayoutStatus::Completed)));
    }
}
