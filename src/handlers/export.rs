use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::bot::secret_matches;
use crate::errors::ServiceError;
use crate::export::{self, CsvExport, ExportKind};
use crate::handlers::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ExportQuery {
    /// Export key, alternative to the Authorization header
    pub key: Option<String>,
}

/// Download every order as CSV
#[utoipa::path(
    get,
    path = "/api/export-orders",
    params(ExportQuery),
    responses(
        (status = 200, description = "UTF-8 CSV with BOM", content_type = "text/csv", body = String),
        (status = 401, description = "Missing or wrong export key", body = crate::errors::ErrorResponse)
    ),
    tag = "Export"
)]
pub async fn export_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServiceError> {
    authorize(&state, &headers, &query)?;
    Ok(csv_response(export::export(&state.store, ExportKind::Orders).await))
}

/// Download every contact message and ticket as CSV
#[utoipa::path(
    get,
    path = "/api/export-messages",
    params(ExportQuery),
    responses(
        (status = 200, description = "UTF-8 CSV with BOM", content_type = "text/csv", body = String),
        (status = 401, description = "Missing or wrong export key", body = crate::errors::ErrorResponse)
    ),
    tag = "Export"
)]
pub async fn export_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServiceError> {
    authorize(&state, &headers, &query)?;
    Ok(csv_response(export::export(&state.store, ExportKind::Messages).await))
}

fn authorize(state: &AppState, headers: &HeaderMap, query: &ExportQuery) -> Result<(), ServiceError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let presented = bearer.or(query.key.as_deref());

    if secret_matches(state.config.export_key(), presented) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized("Invalid export key".to_string()))
    }
}

pub fn csv_response(csv: CsvExport) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", csv.file_name),
            ),
        ],
        csv.content,
    )
        .into_response()
}
