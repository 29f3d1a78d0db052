use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use super::json_body;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::models::{generate_order_number, Order, OrderStatus};
use crate::ApiResponse;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderAccepted {
    pub order_number: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    InProgress,
    Complete,
    Partial,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatus {
    pub order_number: String,
    pub state: DeliveryState,
    pub persisted: bool,
    pub notified: bool,
}

/// Record a confirmed order and notify in the background
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = Order,
    responses(
        (status = 202, description = "Order accepted; persistence and notification run in the background",
            body = crate::ApiResponse<OrderAccepted>),
        (status = 400, description = "Order violates its invariants", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn submit_order(
    State(state): State<AppState>,
    payload: Result<Json<Order>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<OrderAccepted>>), ServiceError> {
    let mut order = json_body(payload)?;
    if order.order_number.trim().is_empty() {
        order.order_number = generate_order_number(Utc::now());
    }
    order.status = OrderStatus::Pending;
    order.check_invariants()?;

    info!(
        order_number = %order.order_number,
        payment_method = %order.payment_method,
        total = %order.total,
        "Order accepted"
    );
    let accepted = OrderAccepted {
        order_number: order.order_number.clone(),
        status: order.status,
    };
    // Detached: the response never waits on the store or the bot
    let _ = state.notifier.spawn_order(order);

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(accepted).with_message("Order received")),
    ))
}

/// Persistence and notification outcome of an order
#[utoipa::path(
    get,
    path = "/api/orders/{order_number}/delivery",
    params(
        ("order_number" = String, Path, description = "Order number, e.g. MX-LZ3K9Q")
    ),
    responses(
        (status = 200, description = "Delivery outcome", body = crate::ApiResponse<DeliveryStatus>),
        (status = 404, description = "Order unknown to this instance", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn order_delivery(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<DeliveryStatus>>, ServiceError> {
    let recorded = state
        .store
        .delivery(&order_number)
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

    let status = match recorded {
        None => DeliveryStatus {
            order_number,
            state: DeliveryState::InProgress,
            persisted: false,
            notified: false,
        },
        Some(outcome) => DeliveryStatus {
            order_number,
            state: if outcome.is_complete() {
                DeliveryState::Complete
            } else {
                DeliveryState::Partial
            },
            persisted: outcome.persisted,
            notified: outcome.notified,
        },
    };
    Ok(Json(ApiResponse::success(status)))
}
