use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::HeaderMap,
};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::bot::{secret_matches, Update, SECRET_TOKEN_HEADER};
use crate::errors::ServiceError;
use crate::handlers::AppState;

/// Inbound bot updates
///
/// Answers 200 whenever the secret checks out so the platform does not redeliver.
#[utoipa::path(
    post,
    path = "/api/telegram-webhook",
    request_body = Value,
    responses(
        (status = 200, description = "Update processed or ignored"),
        (status = 401, description = "Secret token mismatch", body = crate::errors::ErrorResponse)
    ),
    tag = "Bot"
)]
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Update>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let received = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !secret_matches(state.config.telegram_webhook_secret.as_deref(), received) {
        return Err(ServiceError::Unauthorized("Invalid webhook secret".to_string()));
    }

    let update = match payload {
        Ok(Json(update)) => update,
        Err(rejection) => {
            warn!("Unreadable bot update: {}", rejection.body_text());
            return Ok(Json(json!({ "ok": true })));
        }
    };

    match &state.bot_commands {
        Some(handler) => match handler.handle(update).await {
            Ok(outcome) => debug!(?outcome, "Bot update handled"),
            Err(e) => error!("Bot command failed: {}", e),
        },
        None => warn!("Bot update received but the bot token is not configured"),
    }
    Ok(Json(json!({ "ok": true })))
}
