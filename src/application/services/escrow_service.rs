//! Escrow Service
//!
//! Funding through the payment provider, webhook confirmation, and the
//! release/refund settlement used by projects, orders and dispute
//! resolution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::events::{Notifier, RealtimeEvent};
use crate::application::payments::{
    IntentStatus, PaymentError, PaymentEvent, PaymentIntentRequest, PaymentProvider,
};
use crate::application::Actor;
use crate::domain::{
    format_cents, Escrow, EscrowRepository, EscrowStatus, EscrowSubject, FeePolicy,
    NotificationKind, SubjectTransition, Transaction, TransactionKind,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait EscrowService: Send + Sync {
    /// Visible to both parties and admins.
    async fn get_escrow(&self, actor: Actor, escrow_id: i64) -> Result<Escrow, EscrowError>;

    /// Start funding a PENDING escrow. Providers that capture immediately
    /// fund the escrow before this returns.
    async fn fund(&self, actor: Actor, escrow_id: i64) -> Result<FundingResult, EscrowError>;

    /// Apply a verified provider webhook event.
    async fn handle_payment_event(&self, event: PaymentEvent) -> Result<(), EscrowError>;

    /// Pay a FUNDED escrow out to the freelancer, minus the platform fee.
    async fn release(
        &self,
        escrow: &Escrow,
        subject: Option<SubjectTransition>,
    ) -> Result<Escrow, EscrowError>;

    /// Return a PENDING or FUNDED escrow to the client. The escrow and its
    /// subject are settled first; captured funds then go back through the
    /// provider.
    async fn refund(
        &self,
        escrow: &Escrow,
        subject: Option<SubjectTransition>,
    ) -> Result<Escrow, EscrowError>;

    /// Retry provider refunds for escrows refunded before `refunded_before`
    /// whose money has not gone back yet. Returns how many went through.
    async fn reconcile_refunds(
        &self,
        refunded_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize, EscrowError>;
}

#[derive(Debug, Clone)]
pub struct FundingResult {
    pub escrow: Escrow,
    /// Present when the client still has to complete payment in the browser
    pub client_secret: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    #[error("Escrow not found")]
    NotFound,

    #[error("Only the paying client can fund this escrow")]
    NotPayer,

    #[error("Not a party to this escrow")]
    Forbidden,

    #[error("Escrow is {0}")]
    InvalidState(EscrowStatus),

    #[error("Escrow or its project/order changed concurrently")]
    Conflict,

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<EscrowError> for AppError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::NotFound => AppError::NotFound(err.to_string()),
            EscrowError::NotPayer | EscrowError::Forbidden => AppError::Forbidden(err.to_string()),
            EscrowError::InvalidState(_) | EscrowError::Conflict => {
                AppError::Conflict(err.to_string())
            }
            EscrowError::Payment(inner) => inner.into(),
            EscrowError::Internal(inner) => inner,
        }
    }
}

pub struct EscrowServiceImpl<E>
where
    E: EscrowRepository,
{
    escrow_repo: Arc<E>,
    payments: Arc<dyn PaymentProvider>,
    notifier: Notifier,
    id_generator: Arc<SnowflakeGenerator>,
    fee_policy: FeePolicy,
}

impl<E> EscrowServiceImpl<E>
where
    E: EscrowRepository,
{
    pub fn new(
        escrow_repo: Arc<E>,
        payments: Arc<dyn PaymentProvider>,
        notifier: Notifier,
        id_generator: Arc<SnowflakeGenerator>,
        fee_policy: FeePolicy,
    ) -> Self {
        Self {
            escrow_repo,
            payments,
            notifier,
            id_generator,
            fee_policy,
        }
    }

    pub fn repository(&self) -> &Arc<E> {
        &self.escrow_repo
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn link(escrow: &Escrow) -> Option<String> {
        match escrow.subject()? {
            EscrowSubject::Project(id) => Some(format!("/projects/{}", id)),
            EscrowSubject::Order(id) => Some(format!("/orders/{}", id)),
        }
    }

    async fn announce(&self, escrow: &Escrow) {
        self.notifier
            .push(
                vec![escrow.client_id, escrow.freelancer_id],
                RealtimeEvent::EscrowUpdate(escrow.clone()),
            )
            .await;
    }

    /// PENDING -> FUNDED. Already-funded escrows are returned unchanged so
    /// webhook retries are harmless.
    async fn confirm_funding(&self, escrow: &Escrow) -> Result<Escrow, EscrowError> {
        let deposit = Transaction::new(
            self.id_generator.generate(),
            escrow.client_id,
            TransactionKind::Deposit,
            escrow.amount_cents,
            &escrow.currency,
            format!("Escrow {} funded", escrow.id),
        )
        .for_escrow(escrow.id);

        let funded = match self.escrow_repo.mark_funded(escrow.id, &deposit).await? {
            Some(funded) => funded,
            None => {
                let current = self
                    .escrow_repo
                    .find_by_id(escrow.id)
                    .await?
                    .ok_or(EscrowError::NotFound)?;
                return match current.status {
                    EscrowStatus::Pending => Err(EscrowError::Conflict),
                    // Paid after the deal was called off
                    EscrowStatus::Refunded if current.provider_refund_id.is_none() => {
                        tracing::warn!(escrow_id = current.id, "Capture arrived on a refunded escrow");
                        self.return_funds(&current).await
                    }
                    status => {
                        tracing::debug!(escrow_id = escrow.id, %status, "Funding already applied");
                        Ok(current)
                    }
                };
            }
        };

        metrics::record_marketplace_event("escrow_funded");
        tracing::info!(
            escrow_id = funded.id,
            amount_cents = funded.amount_cents,
            "Escrow funded"
        );

        let amount = format_cents(funded.amount_cents, &funded.currency);
        self.notifier
            .notify(
                funded.freelancer_id,
                NotificationKind::EscrowUpdate,
                "Escrow funded",
                format!("{} is now held in escrow for your work.", amount),
                Self::link(&funded),
            )
            .await;
        self.announce(&funded).await;

        Ok(funded)
    }

    /// Refund the escrow's intent at the provider and record the reference.
    /// Safe to repeat: the provider deduplicates refunds per intent.
    async fn return_funds(&self, escrow: &Escrow) -> Result<Escrow, EscrowError> {
        let intent_id = escrow.payment_intent_id.as_deref().ok_or_else(|| {
            AppError::Internal(format!("escrow {} has no payment intent", escrow.id))
        })?;
        let reference = self.payments.refund(intent_id).await?;
        tracing::info!(escrow_id = escrow.id, refund_id = %reference.id, "Provider refund issued");

        match self
            .escrow_repo
            .record_provider_refund(escrow.id, &reference.id)
            .await?
        {
            Some(updated) => Ok(updated),
            // Another attempt recorded it first
            None => self
                .escrow_repo
                .find_by_id(escrow.id)
                .await?
                .ok_or(EscrowError::NotFound),
        }
    }
}

#[async_trait]
impl<E> EscrowService for EscrowServiceImpl<E>
where
    E: EscrowRepository + 'static,
{
    async fn get_escrow(&self, actor: Actor, escrow_id: i64) -> Result<Escrow, EscrowError> {
        let escrow = self
            .escrow_repo
            .find_by_id(escrow_id)
            .await?
            .ok_or(EscrowError::NotFound)?;
        if !escrow.is_party(actor.user_id) && !actor.is_admin() {
            return Err(EscrowError::Forbidden);
        }
        Ok(escrow)
    }

    async fn fund(&self, actor: Actor, escrow_id: i64) -> Result<FundingResult, EscrowError> {
        let escrow = self
            .escrow_repo
            .find_by_id(escrow_id)
            .await?
            .ok_or(EscrowError::NotFound)?;
        if escrow.client_id != actor.user_id {
            return Err(EscrowError::NotPayer);
        }
        if escrow.status != EscrowStatus::Pending {
            return Err(EscrowError::InvalidState(escrow.status));
        }

        let intent = self
            .payments
            .create_payment_intent(&PaymentIntentRequest {
                escrow_id: escrow.id,
                amount_cents: escrow.amount_cents,
                currency: escrow.currency.clone(),
                description: format!("KoiHire escrow {}", escrow.id),
            })
            .await?;

        let escrow = self
            .escrow_repo
            .attach_payment_intent(escrow.id, &intent.id)
            .await?
            .ok_or(EscrowError::Conflict)?;

        tracing::info!(
            escrow_id = escrow.id,
            provider = self.payments.name(),
            intent_id = %intent.id,
            "Payment intent created"
        );

        match intent.status {
            IntentStatus::Succeeded => Ok(FundingResult {
                escrow: self.confirm_funding(&escrow).await?,
                client_secret: None,
            }),
            IntentStatus::RequiresPayment => Ok(FundingResult {
                escrow,
                client_secret: intent.client_secret,
            }),
        }
    }

    async fn handle_payment_event(&self, event: PaymentEvent) -> Result<(), EscrowError> {
        match event {
            PaymentEvent::PaymentSucceeded { intent_id } => {
                match self.escrow_repo.find_by_payment_intent(&intent_id).await? {
                    Some(escrow) => {
                        self.confirm_funding(&escrow).await?;
                    }
                    None => {
                        tracing::warn!(intent_id = %intent_id, "Payment succeeded for unknown intent");
                    }
                }
            }
            PaymentEvent::PaymentFailed { intent_id, reason } => {
                if let Some(escrow) = self.escrow_repo.find_by_payment_intent(&intent_id).await? {
                    tracing::warn!(escrow_id = escrow.id, reason = %reason, "Escrow payment failed");
                    self.notifier
                        .notify(
                            escrow.client_id,
                            NotificationKind::EscrowUpdate,
                            "Payment failed",
                            format!("Your escrow payment did not go through: {}", reason),
                            Self::link(&escrow),
                        )
                        .await;
                }
            }
            PaymentEvent::Ignored { kind } => {
                tracing::debug!(kind = %kind, "Ignoring payment event");
            }
        }
        Ok(())
    }

    async fn release(
        &self,
        escrow: &Escrow,
        subject: Option<SubjectTransition>,
    ) -> Result<Escrow, EscrowError> {
        if escrow.status != EscrowStatus::Funded {
            return Err(EscrowError::InvalidState(escrow.status));
        }

        let split = self.fee_policy.split(escrow.amount_cents);
        let mut entries = vec![Transaction::new(
            self.id_generator.generate(),
            escrow.freelancer_id,
            TransactionKind::Earning,
            split.net,
            &escrow.currency,
            format!("Escrow {} released", escrow.id),
        )
        .for_escrow(escrow.id)];
        if split.fee > 0 {
            entries.push(
                Transaction::new(
                    self.id_generator.generate(),
                    escrow.freelancer_id,
                    TransactionKind::Fee,
                    split.fee,
                    &escrow.currency,
                    format!("Platform fee on escrow {}", escrow.id),
                )
                .for_escrow(escrow.id),
            );
        }

        let released = self
            .escrow_repo
            .release(escrow.id, split.fee, &entries, subject)
            .await?
            .ok_or(EscrowError::Conflict)?;

        metrics::record_marketplace_event("escrow_released");
        tracing::info!(
            escrow_id = released.id,
            net_cents = split.net,
            fee_cents = split.fee,
            "Escrow released"
        );

        self.notifier
            .notify(
                released.freelancer_id,
                NotificationKind::EscrowUpdate,
                "Payment released",
                format!(
                    "{} has been added to your balance.",
                    format_cents(split.net, &released.currency)
                ),
                Some("/wallet".to_string()),
            )
            .await;
        self.announce(&released).await;

        Ok(released)
    }

    async fn refund(
        &self,
        escrow: &Escrow,
        subject: Option<SubjectTransition>,
    ) -> Result<Escrow, EscrowError> {
        let entries = match escrow.status {
            EscrowStatus::Pending => Vec::new(),
            EscrowStatus::Funded => {
                if escrow.payment_intent_id.is_none() {
                    return Err(AppError::Internal(format!(
                        "funded escrow {} has no payment intent",
                        escrow.id
                    ))
                    .into());
                }
                vec![Transaction::new(
                    self.id_generator.generate(),
                    escrow.client_id,
                    TransactionKind::Refund,
                    escrow.amount_cents,
                    &escrow.currency,
                    format!("Escrow {} refunded", escrow.id),
                )
                .for_escrow(escrow.id)]
            }
            status => return Err(EscrowError::InvalidState(status)),
        };

        // Settle before touching the provider so a lost race moves no money
        let mut refunded = self
            .escrow_repo
            .refund(escrow.id, escrow.status, &entries, subject)
            .await?
            .ok_or(EscrowError::Conflict)?;

        metrics::record_marketplace_event("escrow_refunded");
        tracing::info!(escrow_id = refunded.id, "Escrow refunded");

        if escrow.status == EscrowStatus::Funded {
            match self.return_funds(&refunded).await {
                Ok(updated) => refunded = updated,
                Err(e) => tracing::error!(
                    escrow_id = refunded.id,
                    error = %e,
                    "Provider refund failed; left for reconciliation"
                ),
            }
        } else if let Some(intent_id) = refunded.payment_intent_id.as_deref() {
            // A capture that slips through is returned when its webhook arrives
            if let Err(e) = self.payments.cancel_payment_intent(intent_id).await {
                tracing::warn!(escrow_id = refunded.id, error = %e, "Could not cancel payment intent");
            }
        }

        if !entries.is_empty() {
            self.notifier
                .notify(
                    refunded.client_id,
                    NotificationKind::EscrowUpdate,
                    "Escrow refunded",
                    format!(
                        "{} is on its way back to you.",
                        format_cents(refunded.amount_cents, &refunded.currency)
                    ),
                    Self::link(&refunded),
                )
                .await;
        }
        self.announce(&refunded).await;

        Ok(refunded)
    }

    async fn reconcile_refunds(
        &self,
        refunded_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize, EscrowError> {
        let owing = self
            .escrow_repo
            .find_owing_provider_refund(refunded_before, limit)
            .await?;
        let mut returned = 0;
        for escrow in owing {
            match self.return_funds(&escrow).await {
                Ok(_) => returned += 1,
                Err(e) => {
                    tracing::warn!(escrow_id = escrow.id, error = %e, "Provider refund retry failed")
                }
            }
        }
        Ok(returned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::test_support::silent_notifier;
    use crate::application::payments::{MockPaymentProvider, PaymentIntent, ProviderReference};
    use crate::domain::{MockEscrowRepository, ProjectStatus, UserRole};
    use pretty_assertions::assert_eq;

    const CLIENT: i64 = 10;
    const FREELANCER: i64 = 20;

    fn escrow(status: EscrowStatus) -> Escrow {
        let mut e = Escrow::pending(1, EscrowSubject::Project(5), CLIENT, FREELANCER, 10_000, "usd");
        e.status = status;
        if status != EscrowStatus::Pending {
            e.payment_intent_id = Some("pi_1".into());
        }
        e
    }

    fn service(
        repo: MockEscrowRepository,
        payments: MockPaymentProvider,
    ) -> EscrowServiceImpl<MockEscrowRepository> {
        EscrowServiceImpl::new(
            Arc::new(repo),
            Arc::new(payments),
            silent_notifier(),
            Arc::new(SnowflakeGenerator::new(1, 1)),
            FeePolicy::new(1000),
        )
    }

    #[tokio::test]
    async fn test_release_splits_fee() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_release()
            .withf(|id, fee, entries, subject| {
                *id == 1
                    && *fee == 1000
                    && entries.len() == 2
                    && entries[0].kind == TransactionKind::Earning
                    && entries[0].amount_cents == 9000
                    && entries[0].user_id == FREELANCER
                    && entries[1].kind == TransactionKind::Fee
                    && subject.is_some()
            })
            .times(1)
            .returning(|_, fee, _, _| {
                let mut e = escrow(EscrowStatus::Released);
                e.fee_cents = fee;
                Ok(Some(e))
            });

        let svc = service(repo, MockPaymentProvider::new());
        let subject = SubjectTransition::Project {
            id: 5,
            from: vec![ProjectStatus::InProgress],
            to: ProjectStatus::Completed,
        };
        let released = svc
            .release(&escrow(EscrowStatus::Funded), Some(subject))
            .await
            .unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(released.fee_cents, 1000);
    }

    #[tokio::test]
    async fn test_release_requires_funded() {
        let svc = service(MockEscrowRepository::new(), MockPaymentProvider::new());
        let err = svc
            .release(&escrow(EscrowStatus::Pending), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState(EscrowStatus::Pending)));
    }

    #[tokio::test]
    async fn test_release_conflict_when_cas_fails() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_release().returning(|_, _, _, _| Ok(None));
        let svc = service(repo, MockPaymentProvider::new());
        let err = svc
            .release(&escrow(EscrowStatus::Funded), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Conflict));
    }

    #[tokio::test]
    async fn test_refund_pending_skips_provider() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_refund()
            .withf(|_, from, entries, _| *from == EscrowStatus::Pending && entries.is_empty())
            .returning(|_, _, _, _| Ok(Some(escrow(EscrowStatus::Refunded))));
        let mut payments = MockPaymentProvider::new();
        payments.expect_refund().never();

        let svc = service(repo, payments);
        let refunded = svc
            .refund(&escrow(EscrowStatus::Pending), None)
            .await
            .unwrap();
        assert_eq!(refunded.status, EscrowStatus::Refunded);
    }

    #[tokio::test]
    async fn test_refund_funded_goes_through_provider() {
        let mut seq = mockall::Sequence::new();
        let mut repo = MockEscrowRepository::new();
        let mut payments = MockPaymentProvider::new();
        repo.expect_refund()
            .withf(|_, from, entries, _| {
                *from == EscrowStatus::Funded
                    && entries.len() == 1
                    && entries[0].kind == TransactionKind::Refund
                    && entries[0].user_id == CLIENT
                    && entries[0].amount_cents == 10_000
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(Some(escrow(EscrowStatus::Refunded))));
        payments
            .expect_refund()
            .withf(|intent| intent == "pi_1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ProviderReference { id: "re_1".into() }));
        repo.expect_record_provider_refund()
            .withf(|id, refund_id| *id == 1 && refund_id == "re_1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, refund_id| {
                let mut e = escrow(EscrowStatus::Refunded);
                e.provider_refund_id = Some(refund_id.to_string());
                Ok(Some(e))
            });

        let svc = service(repo, payments);
        let refunded = svc
            .refund(&escrow(EscrowStatus::Funded), None)
            .await
            .unwrap();
        assert_eq!(refunded.provider_refund_id.as_deref(), Some("re_1"));
    }

    #[tokio::test]
    async fn test_lost_refund_race_moves_no_money() {
        let mut repo = MockEscrowRepository::new();
        // The order moved on before the cancellation committed
        repo.expect_refund().returning(|_, _, _, _| Ok(None));
        let mut payments = MockPaymentProvider::new();
        payments.expect_refund().never();
        repo.expect_record_provider_refund().never();

        let svc = service(repo, payments);
        let subject = SubjectTransition::Project {
            id: 5,
            from: vec![ProjectStatus::Open],
            to: ProjectStatus::Cancelled,
        };
        let err = svc
            .refund(&escrow(EscrowStatus::Funded), Some(subject))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Conflict));
    }

    #[tokio::test]
    async fn test_provider_refund_failure_keeps_settlement() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_refund()
            .returning(|_, _, _, _| Ok(Some(escrow(EscrowStatus::Refunded))));
        repo.expect_record_provider_refund().never();
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_refund()
            .returning(|_| Err(PaymentError::Unavailable("timeout".into())));

        let svc = service(repo, payments);
        let refunded = svc
            .refund(&escrow(EscrowStatus::Funded), None)
            .await
            .unwrap();
        assert_eq!(refunded.status, EscrowStatus::Refunded);
        assert!(refunded.provider_refund_id.is_none());
    }

    #[tokio::test]
    async fn test_refund_pending_cancels_attached_intent() {
        let with_intent = || {
            let mut e = escrow(EscrowStatus::Pending);
            e.payment_intent_id = Some("pi_open".into());
            e
        };
        let mut repo = MockEscrowRepository::new();
        repo.expect_refund().returning(move |_, _, _, _| {
            let mut e = with_intent();
            e.status = EscrowStatus::Refunded;
            Ok(Some(e))
        });
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_cancel_payment_intent()
            .withf(|intent| intent == "pi_open")
            .times(1)
            .returning(|_| Ok(()));
        payments.expect_refund().never();

        let svc = service(repo, payments);
        let refunded = svc.refund(&with_intent(), None).await.unwrap();
        assert_eq!(refunded.status, EscrowStatus::Refunded);
    }

    #[tokio::test]
    async fn test_capture_on_refunded_escrow_is_returned() {
        let cancelled = || {
            let mut e = escrow(EscrowStatus::Refunded);
            e.funded_at = None;
            e
        };
        let mut repo = MockEscrowRepository::new();
        repo.expect_find_by_payment_intent()
            .returning(move |_| Ok(Some(cancelled())));
        repo.expect_mark_funded().returning(|_, _| Ok(None));
        repo.expect_find_by_id().returning(move |_| Ok(Some(cancelled())));
        repo.expect_record_provider_refund()
            .times(1)
            .returning(move |_, refund_id| {
                let mut e = cancelled();
                e.provider_refund_id = Some(refund_id.to_string());
                Ok(Some(e))
            });
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_refund()
            .withf(|intent| intent == "pi_1")
            .times(1)
            .returning(|_| Ok(ProviderReference { id: "re_late".into() }));

        let svc = service(repo, payments);
        svc.handle_payment_event(PaymentEvent::PaymentSucceeded {
            intent_id: "pi_1".into(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_capture_on_refunded_escrow_surfaces_provider_errors() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_find_by_payment_intent()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Refunded))));
        repo.expect_mark_funded().returning(|_, _| Ok(None));
        repo.expect_find_by_id()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Refunded))));
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_refund()
            .returning(|_| Err(PaymentError::Unavailable("503".into())));

        // An error makes the provider redeliver the webhook
        let svc = service(repo, payments);
        let err = svc
            .handle_payment_event(PaymentEvent::PaymentSucceeded {
                intent_id: "pi_1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Payment(_)));
    }

    #[tokio::test]
    async fn test_reconcile_refunds_retries_owing_escrows() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_find_owing_provider_refund()
            .withf(|_, limit| *limit == 10)
            .returning(|_, _| {
                let mut second = escrow(EscrowStatus::Refunded);
                second.id = 2;
                second.payment_intent_id = Some("pi_2".into());
                Ok(vec![escrow(EscrowStatus::Refunded), second])
            });
        repo.expect_record_provider_refund()
            .times(1)
            .returning(|_, _| Ok(Some(escrow(EscrowStatus::Refunded))));
        let mut payments = MockPaymentProvider::new();
        payments.expect_refund().returning(|intent| {
            if intent == "pi_1" {
                Ok(ProviderReference { id: "re_1".into() })
            } else {
                Err(PaymentError::Unavailable("timeout".into()))
            }
        });

        let svc = service(repo, payments);
        let returned = svc.reconcile_refunds(Utc::now(), 10).await.unwrap();
        assert_eq!(returned, 1);
    }

    #[tokio::test]
    async fn test_settled_escrow_cannot_be_refunded() {
        let svc = service(MockEscrowRepository::new(), MockPaymentProvider::new());
        let err = svc
            .refund(&escrow(EscrowStatus::Released), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState(EscrowStatus::Released)));
    }

    #[tokio::test]
    async fn test_fund_with_immediate_capture() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_find_by_id()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Pending))));
        repo.expect_attach_payment_intent().returning(|_, intent| {
            let mut e = escrow(EscrowStatus::Pending);
            e.payment_intent_id = Some(intent.to_string());
            Ok(Some(e))
        });
        repo.expect_mark_funded()
            .withf(|_, deposit| deposit.kind == TransactionKind::Deposit && deposit.user_id == CLIENT)
            .returning(|_, _| Ok(Some(escrow(EscrowStatus::Funded))));

        let mut payments = MockPaymentProvider::new();
        payments.expect_name().return_const("manual");
        payments.expect_create_payment_intent().returning(|req| {
            Ok(PaymentIntent {
                id: format!("manual_{}", req.escrow_id),
                client_secret: None,
                status: IntentStatus::Succeeded,
            })
        });

        let svc = service(repo, payments);
        let result = svc
            .fund(Actor::new(CLIENT, UserRole::Client), 1)
            .await
            .unwrap();
        assert_eq!(result.escrow.status, EscrowStatus::Funded);
        assert!(result.client_secret.is_none());
    }

    #[tokio::test]
    async fn test_only_client_funds() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_find_by_id()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Pending))));
        let svc = service(repo, MockPaymentProvider::new());
        let err = svc
            .fund(Actor::new(FREELANCER, UserRole::Freelancer), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotPayer));
    }

    #[tokio::test]
    async fn test_duplicate_webhook_is_idempotent() {
        let mut repo = MockEscrowRepository::new();
        repo.expect_find_by_payment_intent()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Pending))));
        repo.expect_mark_funded().returning(|_, _| Ok(None));
        repo.expect_find_by_id()
            .returning(|_| Ok(Some(escrow(EscrowStatus::Funded))));

        let svc = service(repo, MockPaymentProvider::new());
        svc.handle_payment_event(PaymentEvent::PaymentSucceeded {
            intent_id: "pi_1".into(),
        })
        .await
        .unwrap();
    }
}
