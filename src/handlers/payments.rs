use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::HeaderMap,
};

use super::json_body;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::payments::{CreatePaymentIntentRequest, PaymentIntentCreated};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Create a payment intent for a checkout attempt
#[utoipa::path(
    post,
    path = "/api/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Token forwarded to the processor; same as idempotencyKey in the body")
    ),
    responses(
        (status = 200, description = "Intent created", body = PaymentIntentCreated,
            headers(
                ("X-Request-Id" = String, description = "Unique request identifier"),
            )
        ),
        (status = 400, description = "Invalid amount or body", body = crate::errors::ErrorResponse),
        (status = 402, description = "Rejected by the processor", body = crate::errors::ErrorResponse),
        (status = 503, description = "Processor not configured", body = crate::errors::ErrorResponse),
        (status = 504, description = "Processor unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreatePaymentIntentRequest>, JsonRejection>,
) -> Result<Json<PaymentIntentCreated>, ServiceError> {
    let mut request = json_body(payload)?;

    if request.idempotency_key.is_none() {
        request.idempotency_key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }

    let created = state.payments.create(request).await?;
    Ok(Json(created))
}
