use axum::extract::{Json, State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::handlers::AppState;
use crate::ApiResponse;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Integrations {
    pub payment_processor: bool,
    pub document_store: bool,
    pub bot: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub integrations: Integrations,
    /// Records written locally and not yet in the document store
    pub pending_sync: usize,
}

/// Liveness and configured integrations
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = crate::ApiResponse<HealthResponse>)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        integrations: Integrations {
            payment_processor: state.payments.is_configured(),
            document_store: state.store.has_remote(),
            bot: state.bot_commands.is_some(),
        },
        pending_sync: state.store.pending_count(),
    }))
}
