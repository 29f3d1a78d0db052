pub mod export;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod promo;
pub mod telegram;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::errors::ServiceError;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Turns a JSON extractor rejection into the API's error body.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}
