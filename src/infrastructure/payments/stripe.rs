//! Stripe REST client.
//!
//! Stripe takes form-encoded bodies and returns JSON. Every mutating call
//! carries an `Idempotency-Key` derived from our own ids, so a retried
//! request after a timeout cannot charge, refund or transfer twice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;

use crate::application::payments::{
    IntentStatus, PaymentError, PaymentIntent, PaymentIntentRequest, PaymentProvider,
    ProviderReference, TransferRequest,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct StripeProvider {
    http_client: HttpClient,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

impl StripeProvider {
    pub fn new(api_base: &str, secret_key: String) -> Result<Self, PaymentError> {
        let http_client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        idempotency_key: &str,
        form: &[(&str, String)],
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| PaymentError::Unavailable(format!("unreadable response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

/// Map a non-2xx Stripe response onto the provider error kinds.
fn classify_failure(status: StatusCode, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .map(|b| match (b.error.code, b.error.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => status.to_string(),
        })
        .unwrap_or_else(|| status.to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        PaymentError::Unavailable(detail)
    } else {
        PaymentError::Rejected(detail)
    }
}

fn intent_status(status: &str) -> IntentStatus {
    match status {
        "succeeded" => IntentStatus::Succeeded,
        _ => IntentStatus::RequiresPayment,
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("description", request.description.clone()),
            ("metadata[escrow_id]", request.escrow_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        let intent: StripeIntent = self
            .post(
                "/v1/payment_intents",
                &format!("escrow-{}", request.escrow_id),
                &form,
            )
            .await?;

        Ok(PaymentIntent {
            status: intent_status(&intent.status),
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        let _: StripeIntent = self
            .post(
                &format!("/v1/payment_intents/{intent_id}/cancel"),
                &format!("cancel-{intent_id}"),
                &[("cancellation_reason", "abandoned".to_string())],
            )
            .await?;
        Ok(())
    }

    async fn refund(&self, intent_id: &str) -> Result<ProviderReference, PaymentError> {
        let form = [("payment_intent", intent_id.to_string())];
        let refund: StripeObject = self
            .post("/v1/refunds", &format!("refund-{intent_id}"), &form)
            .await?;
        Ok(ProviderReference { id: refund.id })
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<ProviderReference, PaymentError> {
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("destination", request.destination.clone()),
            ("metadata[payout_id]", request.payout_id.to_string()),
        ];
        let transfer: StripeObject = self
            .post(
                "/v1/transfers",
                &format!("payout-{}", request.payout_id),
                &form,
            )
            .await?;
        Ok(ProviderReference { id: transfer.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("succeeded" => IntentStatus::Succeeded)]
    #[test_case("requires_payment_method" => IntentStatus::RequiresPayment)]
    #[test_case("processing" => IntentStatus::RequiresPayment)]
    fn test_intent_status(status: &str) -> IntentStatus {
        intent_status(status)
    }

    #[test]
    fn test_card_errors_are_rejections() {
        let body = r#"{"error":{"code":"card_declined","message":"Your card was declined."}}"#;
        match classify_failure(StatusCode::PAYMENT_REQUIRED, body) {
            PaymentError::Rejected(msg) => {
                assert_eq!(msg, "card_declined: Your card was declined.")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_server_errors_are_unavailable() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "<html>"),
            PaymentError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            PaymentError::Unavailable(_)
        ));
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let provider = StripeProvider::new("https://api.stripe.com/", "sk_test".into()).unwrap();
        assert_eq!(provider.api_base, "https://api.stripe.com");
    }
}
