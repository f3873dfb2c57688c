//! Provider that settles everything instantly without moving real money.

use async_trait::async_trait;

use crate::application::payments::{
    IntentStatus, PaymentError, PaymentIntent, PaymentIntentRequest, PaymentProvider,
    ProviderReference, TransferRequest,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ManualProvider;

#[async_trait]
impl PaymentProvider for ManualProvider {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        tracing::debug!(
            escrow_id = request.escrow_id,
            amount_cents = request.amount_cents,
            "Manual charge confirmed"
        );
        Ok(PaymentIntent {
            id: format!("manual_pi_{}", request.escrow_id),
            client_secret: None,
            status: IntentStatus::Succeeded,
        })
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        tracing::debug!(intent_id, "Manual intent cancelled");
        Ok(())
    }

    async fn refund(&self, intent_id: &str) -> Result<ProviderReference, PaymentError> {
        Ok(ProviderReference {
            id: format!("manual_re_{intent_id}"),
        })
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<ProviderReference, PaymentError> {
        Ok(ProviderReference {
            id: format!("manual_tr_{}", request.payout_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_intent_is_captured_immediately() {
        let intent = ManualProvider
            .create_payment_intent(&PaymentIntentRequest {
                escrow_id: 42,
                amount_cents: 5000,
                currency: "usd".into(),
                description: "Escrow 42".into(),
            })
            .await
            .unwrap();

        assert_eq!(intent.id, "manual_pi_42");
        assert_eq!(intent.status, IntentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_references_are_deterministic() {
        let refund = ManualProvider.refund("manual_pi_42").await.unwrap();
        assert_eq!(refund.id, "manual_re_manual_pi_42");

        let transfer = ManualProvider
            .transfer(&TransferRequest {
                payout_id: 7,
                amount_cents: 2500,
                currency: "usd".into(),
                destination: "acct_1".into(),
            })
            .await
            .unwrap();
        assert_eq!(transfer.id, "manual_tr_7");
    }
}
