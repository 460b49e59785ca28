//! External payment processor
//!
//! Card and wallet providers are simulated: intents, captures and refunds
//! return generated identifiers. The method id [`DECLINED_TEST_METHOD`]
//! always declines so the failure path can be exercised end to end.

use rand::Rng;

use crate::error::{ApiError, ApiResult};

use super::model::PaymentProvider;

pub const DECLINED_TEST_METHOD: &str = "pm_card_chargeDeclined";

/// Handle returned when an intent is opened with the processor
#[derive(Debug, Clone)]
pub struct IntentHandle {
    pub transaction_id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded,
    Declined(String),
}

#[derive(Debug, Clone, Default)]
pub struct PaymentGateway;

impl PaymentGateway {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_intent(
        &self,
        provider: PaymentProvider,
        amount_cents: i64,
        currency: &str,
    ) -> ApiResult<IntentHandle> {
        let handle = match provider {
            PaymentProvider::Stripe => {
                let transaction_id = format!("pi_sim_{}", random_token(12));
                IntentHandle {
                    client_secret: Some(format!("{}_secret_{}", transaction_id, random_token(12))),
                    transaction_id,
                }
            }
            PaymentProvider::Paypal => IntentHandle {
                transaction_id: format!("PAYPAL-SIM-{}", random_token(8).to_uppercase()),
                client_secret: None,
            },
            other => {
                return Err(ApiError::BadRequest(format!(
                    "Payment provider {:?} does not support online payments",
                    other
                )))
            }
        };

        tracing::info!(
            provider = ?provider,
            amount_cents,
            currency,
            transaction_id = %handle.transaction_id,
            "Payment intent created"
        );
        tracing::warn!("Using simulated payment processor");

        Ok(handle)
    }

    pub async fn charge(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
        payment_method_id: &str,
    ) -> ApiResult<ChargeOutcome> {
        tracing::info!(provider = ?provider, transaction_id, "Capturing payment");

        if payment_method_id == DECLINED_TEST_METHOD {
            return Ok(ChargeOutcome::Declined("Your card was declined".to_string()));
        }

        match provider {
            PaymentProvider::Stripe | PaymentProvider::Paypal => Ok(ChargeOutcome::Succeeded),
            other => Err(ApiError::BadRequest(format!(
                "Payment provider {:?} cannot capture payments",
                other
            ))),
        }
    }

    /// Refund part of a captured payment; returns the processor's reference
    pub async fn refund(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
        amount_cents: i64,
    ) -> ApiResult<String> {
        let reference = match provider {
            PaymentProvider::Stripe => format!("re_{}", random_token(12)),
            PaymentProvider::Paypal => format!("PAYPAL-REFUND-{}", random_token(8).to_uppercase()),
            other => {
                return Err(ApiError::BadRequest(format!(
                    "Payment provider {:?} cannot issue refunds",
                    other
                )))
            }
        };

        tracing::info!(
            provider = ?provider,
            transaction_id,
            amount_cents,
            reference = %reference,
            "Refund issued"
        );

        Ok(reference)
    }
}

/// Random hex string of `bytes` bytes
pub fn random_token(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let buf: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_intent_ids_follow_provider_format() {
        let gateway = PaymentGateway::new();

        let card = gateway
            .create_intent(PaymentProvider::Stripe, 2000, "USD")
            .await
            .unwrap();
        assert!(card.transaction_id.starts_with("pi_sim_"));
        assert!(card.client_secret.is_some());

        let paypal = gateway
            .create_intent(PaymentProvider::Paypal, 2000, "USD")
            .await
            .unwrap();
        assert!(paypal.transaction_id.starts_with("PAYPAL-SIM-"));
        assert!(paypal.client_secret.is_none());

        assert!(gateway
            .create_intent(PaymentProvider::Cash, 2000, "USD")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_test_method_is_declined() {
        let gateway = PaymentGateway::new();
        let outcome = gateway
            .charge(PaymentProvider::Stripe, "pi_sim_1", DECLINED_TEST_METHOD)
            .await
            .unwrap();
        assert!(matches!(outcome, ChargeOutcome::Declined(_)));

        let outcome = gateway
            .charge(PaymentProvider::Stripe, "pi_sim_1", "pm_card_visa")
            .await
            .unwrap();
        assert_eq!(outcome, ChargeOutcome::Succeeded);
    }

    #[test]
    fn test_random_token_length() {
        assert_eq!(random_token(8).len(), 16);
    }
}
