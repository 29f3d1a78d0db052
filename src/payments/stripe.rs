use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Parameters of a payment intent, amount already in minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntentParams {
    pub amount: i64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentResponse {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

/// Server-side half of the payment processor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        params: CreateIntentParams,
    ) -> Result<PaymentIntentResponse, ServiceError>;
}

/// Stripe payment processor over the REST API
#[derive(Clone)]
pub struct StripePaymentProcessor {
    secret_key: String,
    api_base: String,
    max_network_retries: u32,
    client: reqwest::Client,
}

impl StripePaymentProcessor {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        max_network_retries: u32,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            max_network_retries,
            client,
        })
    }

    /// Fails with `NOT_CONFIGURED` when the secret key is absent.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let secret = cfg.require_stripe_secret()?;
        Self::new(
            secret,
            cfg.stripe_api_base.clone(),
            cfg.stripe_max_network_retries,
            cfg.http_timeout(),
        )
    }

    fn form_params(params: &CreateIntentParams) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), params.amount.to_string()),
            ("currency".to_string(), params.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in &params.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }
        form
    }

    async fn processor_error(response: reqwest::Response) -> ServiceError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<StripeErrorEnvelope>(&body) {
            Ok(envelope) => {
                warn!(
                    status,
                    error_type = envelope.error.error_type.as_deref().unwrap_or("unknown"),
                    code = envelope.error.code.as_deref().unwrap_or("none"),
                    "Processor rejected payment intent"
                );
                envelope
                    .error
                    .message
                    .unwrap_or_else(|| format!("Payment processor error ({})", status))
            }
            Err(_) => {
                warn!(status, body = %body, "Processor returned a non-JSON error");
                format!("Payment processor error ({})", status)
            }
        };
        ServiceError::ProcessorError { status, message }
    }
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    #[instrument(skip(self, params), fields(amount = params.amount, currency = %params.currency))]
    async fn create_payment_intent(
        &self,
        params: CreateIntentParams,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let url = format!("{}/v1/payment_intents", self.api_base);
        let form = Self::form_params(&params);
        // One key per logical call keeps network retries from creating duplicates
        let idempotency_key = params
            .idempotency_key
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut attempt = 0;
        let response = loop {
            let result = self
                .client
                .post(&url)
                .basic_auth(&self.secret_key, Some(""))
                .header("Idempotency-Key", &idempotency_key)
                .form(&form)
                .send()
                .await;

            match result {
                Ok(response) => break response,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_network_retries => {
                    let backoff = retry_backoff(attempt);
                    attempt += 1;
                    warn!(
                        "Processor unreachable: {} (retry {}/{} in {:?})",
                        e, attempt, self.max_network_retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(ServiceError::from(e)),
            }
        };

        if !response.status().is_success() {
            return Err(Self::processor_error(response).await);
        }

        let payment_intent: PaymentIntentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Failed to parse processor response: {}", e))
        })?;

        info!("PaymentIntent created: {}", payment_intent.id);
        Ok(payment_intent)
    }
}

impl StripePaymentProcessor {
    /// Confirms an intent server-side with a saved or test payment method.
    ///
    /// Intents left needing customer action count as declined.
    #[instrument(skip(self))]
    pub async fn confirm_payment_intent(
        &self,
        payment_intent_id: &str,
        payment_method: &str,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let url = format!(
            "{}/v1/payment_intents/{}/confirm",
            self.api_base, payment_intent_id
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Some(""))
            .form(&[("payment_method", payment_method)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::processor_error(response).await);
        }

        let payment_intent: PaymentIntentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Failed to parse processor response: {}", e))
        })?;

        match payment_intent.status.as_str() {
            "succeeded" | "processing" | "requires_capture" => {
                info!("PaymentIntent confirmed: {}", payment_intent.id);
                Ok(payment_intent)
            }
            other => Err(ServiceError::ProcessorError {
                status: 402,
                message: format!("Payment not completed (status: {})", other),
            }),
        }
    }
}

fn retry_backoff(attempt: u32) -> Duration {
    INITIAL_RETRY_BACKOFF * 2_u32.pow(attempt)
}

/// Longest a processor call can take: every attempt timing out plus the backoff between them.
pub fn max_call_duration(timeout: Duration, max_network_retries: u32) -> Duration {
    let backoff: Duration = (0..max_network_retries).map(retry_backoff).sum();
    timeout * (max_network_retries + 1) + backoff
}

/// Payment intent id embedded in a client secret (`pi_..._secret_...`).
pub fn intent_id_from_client_secret(client_secret: &str) -> Option<&str> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id)
        .filter(|id| id.starts_with("pi_"))
}
