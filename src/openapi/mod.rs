use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MX Storefront API",
        version = "0.3.0",
        description = r#"
# MX Storefront backend

Checkout backend for a single-product storefront.

- **Payments**: payment intents sized in major units of the order currency
- **Orders**: confirmed orders are stored and announced to the orders channel
- **Notifications**: contact messages and support tickets
- **Export**: CSV downloads of orders and messages, also available through bot commands

## Error Handling

Every failure answers with the same body:

```json
{
  "error": "Amount must be at least 50 minor units (got 12)",
  "code": "INVALID_AMOUNT",
  "requestId": "5f0c6d1e-3a7b-4f7e-9d55-2f1b0e9c8a11",
  "timestamp": "2026-03-09T10:30:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Payments", description = "Payment intent creation"),
        (name = "Orders", description = "Order submission and delivery status"),
        (name = "Notifications", description = "Contact messages and support tickets"),
        (name = "Promo Codes", description = "Discount code lookup"),
        (name = "Export", description = "CSV downloads"),
        (name = "Bot", description = "Messaging bot webhook"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::payments::create_payment_intent,
        crate::handlers::orders::submit_order,
        crate::handlers::orders::order_delivery,
        crate::handlers::notifications::notify,
        crate::handlers::promo::get_promo_code,
        crate::handlers::export::export_orders,
        crate::handlers::export::export_messages,
        crate::handlers::telegram::telegram_webhook,
        crate::handlers::health::health,
    ),
    components(
        schemas(
            crate::payments::CreatePaymentIntentRequest,
            crate::payments::PaymentIntentCreated,
            crate::models::Order,
            crate::models::OrderItem,
            crate::models::Customer,
            crate::models::PaymentMethod,
            crate::models::OrderStatus,
            crate::models::ContactMessage,
            crate::models::MessageKind,
            crate::handlers::orders::OrderAccepted,
            crate::handlers::orders::DeliveryStatus,
            crate::handlers::notifications::MessageAccepted,
            crate::handlers::promo::PromoQuote,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
