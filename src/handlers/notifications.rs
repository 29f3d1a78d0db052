use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use super::json_body;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::models::{ContactMessage, MessageKind};
use crate::ApiResponse;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageAccepted {
    pub kind: MessageKind,
    pub received: bool,
}

/// Submit a contact message or support ticket
#[utoipa::path(
    post,
    path = "/api/notify",
    request_body = ContactMessage,
    responses(
        (status = 202, description = "Message accepted", body = crate::ApiResponse<MessageAccepted>),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Notifications"
)]
pub async fn notify(
    State(state): State<AppState>,
    payload: Result<Json<ContactMessage>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<MessageAccepted>>), ServiceError> {
    let message = json_body(payload)?;
    message.validate()?;
    if !message.has_reply_channel() {
        return Err(ServiceError::ValidationError(
            "An email address or phone number is required".to_string(),
        ));
    }

    let kind = message.kind;
    let _ = state.notifier.spawn_message(message);

    Ok((
        StatusCode::ACCEPTED,
        Json(
            ApiResponse::success(MessageAccepted {
                kind,
                received: true,
            })
            .with_message("Message received"),
        ),
    ))
}
