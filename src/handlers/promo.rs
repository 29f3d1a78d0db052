use axum::extract::{Json, Path, Query, State};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::models::{PromoBook, PromoCode, MAX_ORDER_AMOUNT};
use crate::store::{TieredStore, PROMO_CODES_COLLECTION};
use crate::ApiResponse;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PromoQuery {
    /// Cart subtotal to price the discount against
    #[param(value_type = Option<f64>)]
    pub subtotal: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoQuote {
    pub code: String,
    pub percent: u8,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub total: Option<Decimal>,
}

/// Promo codes from both store tiers; malformed documents are skipped.
pub async fn load_promo_book(store: &TieredStore) -> PromoBook {
    let codes = store
        .list(PROMO_CODES_COLLECTION)
        .await
        .into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match doc.into_record::<PromoCode>() {
                Ok(code) => Some(code),
                Err(e) => {
                    warn!(doc_id = %id, "Skipping malformed promo code: {}", e);
                    None
                }
            }
        })
        .collect();
    PromoBook::new(codes)
}

/// Resolve a promo code, enforcing its expiry
#[utoipa::path(
    get,
    path = "/api/promo-codes/{code}",
    params(
        ("code" = String, Path, description = "Promo code, case-insensitive"),
        PromoQuery
    ),
    responses(
        (status = 200, description = "Valid promo code", body = crate::ApiResponse<PromoQuote>),
        (status = 400, description = "Expired or invalid code", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown code", body = crate::errors::ErrorResponse)
    ),
    tag = "Promo Codes"
)]
pub async fn get_promo_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<PromoQuery>,
) -> Result<Json<ApiResponse<PromoQuote>>, ServiceError> {
    let book = load_promo_book(&state.store).await;
    let promo = book.lookup(&code, Utc::now())?;

    let max = Decimal::from(MAX_ORDER_AMOUNT);
    if let Some(subtotal) = query.subtotal.filter(|s| s.is_sign_negative() || *s > max) {
        return Err(ServiceError::ValidationError(format!(
            "Subtotal must be between 0 and {}: {}",
            MAX_ORDER_AMOUNT, subtotal
        )));
    }
    let discount = query
        .subtotal
        .map(|s| {
            promo.discount_for(s).ok_or_else(|| {
                ServiceError::ValidationError(format!("Cannot price a discount on {}", s))
            })
        })
        .transpose()?;

    Ok(Json(ApiResponse::success(PromoQuote {
        code: promo.code.clone(),
        percent: promo.percent,
        expires_at: promo.expires_at(),
        discount,
        total: query.subtotal.zip(discount).map(|(s, d)| s - d),
    })))
}
