use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::amount::{normalize_currency, to_minor_units};
use super::metadata::{build_intent_metadata, ItemSummary};
use super::stripe::{CreateIntentParams, PaymentProcessor, StripePaymentProcessor};
use crate::config::AppConfig;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentCustomer {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Body of `POST /api/create-payment-intent`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "amount": 1899,
    "currency": "ils",
    "customer": { "name": "Dana Levi", "email": "dana@example.com" },
    "items": [{ "id": "mx-1", "name": "MX Scooter", "qty": 1 }],
    "idempotencyKey": "3f0c9d5e-8a1b-4c1e-9d7f-1b2c3d4e5f60"
}))]
pub struct CreatePaymentIntentRequest {
    /// Amount in major units (shekels, dollars)
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub customer: Option<IntentCustomer>,
    #[serde(default)]
    pub items: Vec<ItemSummary>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// Creates payment intents; the single place amounts are converted.
#[derive(Clone)]
pub struct PaymentIntentService {
    processor: Option<Arc<dyn PaymentProcessor>>,
    default_currency: String,
}

impl PaymentIntentService {
    pub fn new(processor: Option<Arc<dyn PaymentProcessor>>, default_currency: impl Into<String>) -> Self {
        Self {
            processor,
            default_currency: default_currency.into(),
        }
    }

    /// Without a secret key the service still answers, with `NOT_CONFIGURED`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let processor: Option<Arc<dyn PaymentProcessor>> =
            match StripePaymentProcessor::from_config(cfg) {
                Ok(processor) => Some(Arc::new(processor)),
                Err(ServiceError::NotConfigured(_)) => None,
                Err(e) => return Err(e),
            };
        Ok(Self::new(processor, cfg.default_currency.clone()))
    }

    pub fn is_configured(&self) -> bool {
        self.processor.is_some()
    }

    #[instrument(skip(self, request), fields(amount = %request.amount))]
    pub async fn create(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntentCreated, ServiceError> {
        let currency = normalize_currency(
            request
                .currency
                .as_deref()
                .unwrap_or(self.default_currency.as_str()),
        )?;
        let minor = to_minor_units(request.amount, &currency)?;

        let processor = self.processor.as_ref().ok_or_else(|| {
            error!("Payment intent requested but the processor secret key is not configured");
            ServiceError::not_configured("stripe_secret_key is not set")
        })?;

        let customer = request.customer.unwrap_or_default();
        let metadata = build_intent_metadata(
            customer.name.as_deref(),
            customer.email.as_deref(),
            &request.items,
            &request.metadata,
        );

        let intent = processor
            .create_payment_intent(CreateIntentParams {
                amount: minor.value,
                currency,
                metadata,
                idempotency_key: request.idempotency_key.filter(|k| !k.trim().is_empty()),
            })
            .await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            ServiceError::ExternalServiceError(format!(
                "Payment intent {} returned without a client secret",
                intent.id
            ))
        })?;

        info!(payment_intent_id = %intent.id, amount = minor.value, "payment intent ready");
        Ok(PaymentIntentCreated {
            client_secret,
            payment_intent_id: intent.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::stripe::{MockPaymentProcessor, PaymentIntentResponse};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            amount,
            currency: None,
            metadata: BTreeMap::new(),
            customer: Some(IntentCustomer {
                name: Some("Dana Levi".into()),
                email: Some("dana@example.com".into()),
            }),
            items: vec![ItemSummary {
                id: "mx-1".into(),
                name: "MX Scooter".into(),
                qty: 1,
            }],
            idempotency_key: Some("attempt-1".into()),
        }
    }

    #[tokio::test]
    async fn converts_amount_and_forwards_metadata() {
        let mut processor = MockPaymentProcessor::new();
        processor
            .expect_create_payment_intent()
            .withf(|params| {
                params.amount == 189_900
                    && params.currency == "ils"
                    && params.metadata["customer_email"] == "dana@example.com"
                    && params.metadata["items"] == "MX Scooter x1"
                    && params.idempotency_key.as_deref() == Some("attempt-1")
            })
            .times(1)
            .returning(|params| {
                Ok(PaymentIntentResponse {
                    id: "pi_123".into(),
                    amount: params.amount,
                    currency: params.currency,
                    status: "requires_payment_method".into(),
                    client_secret: Some("pi_123_secret_abc".into()),
                })
            });

        let service = PaymentIntentService::new(Some(Arc::new(processor)), "ils");
        let created = service.create(request(dec!(1899))).await.unwrap();
        assert_eq!(created.payment_intent_id, "pi_123");
        assert_eq!(created.client_secret, "pi_123_secret_abc");
    }

    #[tokio::test]
    async fn sub_minimum_amount_never_reaches_processor() {
        let mut processor = MockPaymentProcessor::new();
        processor.expect_create_payment_intent().times(0);

        let service = PaymentIntentService::new(Some(Arc::new(processor)), "ils");
        assert_matches!(
            service.create(request(dec!(0.49))).await,
            Err(ServiceError::InvalidAmount(_))
        );
    }

    #[tokio::test]
    async fn missing_processor_is_not_configured() {
        let service = PaymentIntentService::new(None, "ils");
        assert!(!service.is_configured());
        assert_matches!(
            service.create(request(dec!(100))).await,
            Err(ServiceError::NotConfigured(_))
        );
    }

    #[tokio::test]
    async fn processor_errors_propagate_unchanged() {
        let mut processor = MockPaymentProcessor::new();
        processor.expect_create_payment_intent().returning(|_| {
            Err(ServiceError::ProcessorError {
                status: 402,
                message: "Your card was declined.".into(),
            })
        });

        let service = PaymentIntentService::new(Some(Arc::new(processor)), "ils");
        assert_matches!(
            service.create(request(dec!(100))).await,
            Err(ServiceError::ProcessorError { status: 402, ref message }) if message == "Your card was declined."
        );
    }

    #[tokio::test]
    async fn missing_client_secret_is_an_external_failure() {
        let mut processor = MockPaymentProcessor::new();
        processor.expect_create_payment_intent().returning(|params| {
            Ok(PaymentIntentResponse {
                id: "pi_no_secret".into(),
                amount: params.amount,
                currency: params.currency,
                status: "requires_payment_method".into(),
                client_secret: None,
            })
        });

        let service = PaymentIntentService::new(Some(Arc::new(processor)), "ils");
        assert_matches!(
            service.create(request(dec!(100))).await,
            Err(ServiceError::ExternalServiceError(_))
        );
    }
}
