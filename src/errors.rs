use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "error": "Amount must be at least 50 minor units (got 12)",
    "code": "INVALID_AMOUNT",
    "requestId": "req-abc123xyz",
    "timestamp": "2026-03-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Message safe to show to the customer
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("{message}")]
    ProcessorError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ServiceError::NetworkError(err.to_string())
        } else if err.is_decode() {
            ServiceError::SerializationError(err.to_string())
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl ServiceError {
    pub fn not_configured(what: impl Into<String>) -> Self {
        ServiceError::NotConfigured(what.into())
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::InvalidAmount(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProcessorError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::NetworkError(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::NotificationError(_) | Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::SerializationError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable code clients branch on.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::NotConfigured(_) => "NOT_CONFIGURED",
            Self::ProcessorError { .. } => "PROCESSOR_ERROR",
            Self::NetworkError(_) => "NETWORK_ERROR",
            Self::NotificationError(_) => "NOTIFICATION_ERROR",
            Self::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::SerializationError(_) | Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Configuration and internal errors return generic messages; the detail is logged.
    pub fn response_message(&self) -> String {
        match self {
            Self::NotConfigured(_) => "Service unavailable".to_string(),
            Self::NetworkError(_) => {
                "Could not reach the payment service, please try again".to_string()
            }
            Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::ValidationError(msg)
            | Self::InvalidAmount(msg)
            | Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Unauthorized(msg) => msg.clone(),
            Self::ProcessorError { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    /// Whether the customer can fix the problem and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::InvalidAmount(_)
                | Self::ProcessorError { .. }
                | Self::NetworkError(_)
        )
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.response_message(),
            code: self.error_code().to_string(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.error_code(), error = %self, "request rejected");
        }

        (status, Json(self.to_response_body())).into_response()
    }
}
