//! Payment Provider Implementations
//!
//! - [`StripeProvider`]: Stripe REST API over `reqwest`
//! - [`ManualProvider`]: confirms everything immediately, for development
//! - [`webhook`]: Stripe webhook signature verification and event parsing

pub mod manual;
pub mod stripe;
pub mod webhook;

use std::sync::Arc;

pub use manual::ManualProvider;
pub use stripe::StripeProvider;
pub use webhook::verify_stripe_webhook;

use crate::application::payments::{PaymentError, PaymentProvider};
use crate::config::{PaymentProviderKind, PaymentSettings};

/// Build the provider selected by `payments.provider`.
pub fn create_payment_provider(
    settings: &PaymentSettings,
) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
    match settings.provider {
        PaymentProviderKind::Stripe => {
            let secret_key = settings
                .stripe_secret_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| PaymentError::Unavailable("Stripe secret key missing".into()))?;
            let provider = StripeProvider::new(&settings.stripe_api_base, secret_key)?;
            tracing::info!(api_base = %settings.stripe_api_base, "Using Stripe payment provider");
            Ok(Arc::new(provider))
        }
        PaymentProviderKind::Manual => {
            tracing::warn!("Using manual payment provider; charges are confirmed without payment");
            Ok(Arc::new(ManualProvider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::test_settings;

    #[test]
    fn test_manual_provider_selected() {
        let settings = test_settings();
        let provider = create_payment_provider(&settings.payments).unwrap();
        assert_eq!(provider.name(), "manual");
    }

    #[test]
    fn test_stripe_requires_key() {
        let mut settings = test_settings().payments;
        settings.provider = PaymentProviderKind::Stripe;
        settings.stripe_secret_key = None;
        assert!(create_payment_provider(&settings).is_err());

        settings.stripe_secret_key = Some("sk_test_123".into());
        let provider = create_payment_provider(&settings).unwrap();
        assert_eq!(provider.name(), "stripe");
    }
}
