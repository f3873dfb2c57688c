//! Payment provider abstraction used for escrow funding, refunds and
//! payout transfers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Cents;
use crate::shared::error::AppError;

/// Request to collect `amount_cents` from a client into escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    pub escrow_id: i64,
    pub amount_cents: Cents,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    /// The client still has to pay; confirmation arrives by webhook
    RequiresPayment,
    /// Funds are captured
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the browser to complete payment
    pub client_secret: Option<String>,
    pub status: IntentStatus,
}

/// Request to send a payout to a connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub payout_id: i64,
    pub amount_cents: Cents,
    pub currency: String,
    pub destination: String,
}

/// Provider-side reference of a refund or transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReference {
    pub id: String,
}

/// Payment events delivered by provider webhooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    PaymentSucceeded { intent_id: String },
    PaymentFailed { intent_id: String, reason: String },
    /// Any event type the marketplace does not act on
    Ignored { kind: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature => AppError::Unauthorized(err.to_string()),
            PaymentError::MalformedPayload(_) => AppError::BadRequest(err.to_string()),
            PaymentError::Rejected(_) | PaymentError::Unavailable(_) => {
                AppError::PaymentProvider(err.to_string())
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Void an intent the client has not paid yet.
    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError>;

    /// Refund a captured intent in full.
    async fn refund(&self, intent_id: &str) -> Result<ProviderReference, PaymentError>;

    async fn transfer(&self, request: &TransferRequest) -> Result<ProviderReference, PaymentError>;
}
