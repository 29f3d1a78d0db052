//! Stateless single-request entry points.
//!
//! Every invocation builds its own clients from configuration and shares
//! nothing with the previous one. Semantics match the HTTP handlers.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::bot::{secret_matches, BotCommandHandler, Update, SECRET_TOKEN_HEADER};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::export::{self, ExportKind};
use crate::models::{generate_order_number, ContactMessage, Order, OrderStatus};
use crate::notifications::{OrderNotifier, TelegramClient};
use crate::payments::{CreatePaymentIntentRequest, PaymentIntentService};
use crate::store::TieredStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Function {
    CreatePaymentIntent,
    Notify,
    ExportOrders,
    TelegramWebhook,
}

impl Function {
    fn allowed_method(self) -> &'static str {
        match self {
            Function::ExportOrders => "GET",
            _ => "POST",
        }
    }
}

/// Request envelope handed to a function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRequest {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    /// Raw request body
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl FunctionRequest {
    pub fn post(body: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Header lookup, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json_body<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ServiceError> {
        let raw = self
            .body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Request body is required".to_string()))?;
        serde_json::from_str(raw).map_err(|e| ServiceError::BadRequest(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FunctionResponse {
    fn new(status: u16, cfg: &AppConfig) -> Self {
        Self {
            status,
            headers: cors_headers(cfg),
            body: String::new(),
        }
    }

    fn json(status: u16, cfg: &AppConfig, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status, cfg);
        response
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        response.body = body.to_string();
        response
    }

    fn error(cfg: &AppConfig, err: &ServiceError) -> Self {
        let body = serde_json::to_value(err.to_response_body()).unwrap_or_else(|_| json!({}));
        Self::json(err.status_code().as_u16(), cfg, &body)
    }
}

fn cors_headers(cfg: &AppConfig) -> BTreeMap<String, String> {
    let origin = cfg
        .cors_origins()
        .into_iter()
        .next()
        .unwrap_or_else(|| "*".to_string());
    BTreeMap::from([
        ("Access-Control-Allow-Origin".to_string(), origin),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type, Authorization, Idempotency-Key".to_string(),
        ),
        (
            "Access-Control-Allow-Methods".to_string(),
            "GET, POST, OPTIONS".to_string(),
        ),
    ])
}

/// Runs one function to completion. Failures are rendered into the response.
#[instrument(skip(cfg, request), fields(method = %request.method))]
pub async fn invoke(function: Function, cfg: &AppConfig, request: FunctionRequest) -> FunctionResponse {
    if request.method.eq_ignore_ascii_case("OPTIONS") {
        return FunctionResponse::new(204, cfg);
    }
    if !request.method.eq_ignore_ascii_case(function.allowed_method()) {
        let mut response = FunctionResponse::json(
            405,
            cfg,
            &json!({ "error": "Method not allowed", "code": "METHOD_NOT_ALLOWED" }),
        );
        response
            .headers
            .insert("Allow".to_string(), function.allowed_method().to_string());
        return response;
    }

    let result = match function {
        Function::CreatePaymentIntent => create_payment_intent(cfg, &request).await,
        Function::Notify => notify(cfg, &request).await,
        Function::ExportOrders => export_orders(cfg, &request).await,
        Function::TelegramWebhook => telegram_webhook(cfg, &request).await,
    };
    result.unwrap_or_else(|err| {
        warn!(?function, code = err.error_code(), "Function failed: {}", err);
        FunctionResponse::error(cfg, &err)
    })
}

async fn create_payment_intent(
    cfg: &AppConfig,
    request: &FunctionRequest,
) -> Result<FunctionResponse, ServiceError> {
    let mut body: CreatePaymentIntentRequest = request.json_body()?;
    if body.idempotency_key.is_none() {
        body.idempotency_key = request
            .header("idempotency-key")
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
    }

    let created = PaymentIntentService::from_config(cfg)?.create(body).await?;
    Ok(FunctionResponse::json(200, cfg, &serde_json::to_value(created)?))
}

/// Body of the notify function: an order, or a contact message / ticket.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NotifyRequest {
    Order { order: Box<Order> },
    Message(ContactMessage),
}

async fn notify(cfg: &AppConfig, request: &FunctionRequest) -> Result<FunctionResponse, ServiceError> {
    let payload: NotifyRequest = request.json_body()?;
    let notifier = OrderNotifier::from_config(cfg, TieredStore::from_config(cfg)?);

    let (kind, outcome) = match payload {
        NotifyRequest::Order { order } => {
            let mut order = *order;
            if order.order_number.trim().is_empty() {
                order.order_number = generate_order_number(Utc::now());
            }
            order.status = OrderStatus::Pending;
            order.check_invariants()?;
            info!(order_number = %order.order_number, "Notifying order");
            ("order".to_string(), notifier.notify_order(&order).await)
        }
        NotifyRequest::Message(message) => {
            message.validate()?;
            if !message.has_reply_channel() {
                return Err(ServiceError::ValidationError(
                    "An email address or phone number is required".to_string(),
                ));
            }
            (message.kind.to_string(), notifier.notify_message(&message).await)
        }
    };

    Ok(FunctionResponse::json(
        200,
        cfg,
        &json!({
            "success": true,
            "type": kind,
            "persisted": outcome.persisted,
            "notified": outcome.notified,
        }),
    ))
}

async fn export_orders(cfg: &AppConfig, request: &FunctionRequest) -> Result<FunctionResponse, ServiceError> {
    let presented = request
        .header("authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .or(request.query.get("key").map(String::as_str));
    if !secret_matches(cfg.export_key(), presented) {
        return Err(ServiceError::Unauthorized("Invalid export key".to_string()));
    }

    let store = TieredStore::from_config(cfg)?;
    let csv = export::export(&store, ExportKind::Orders).await;

    let mut response = FunctionResponse::new(200, cfg);
    response
        .headers
        .insert("Content-Type".to_string(), "text/csv; charset=utf-8".to_string());
    response.headers.insert(
        "Content-Disposition".to_string(),
        format!("attachment; filename=\"{}\"", csv.file_name),
    );
    response.body = csv.content;
    Ok(response)
}

async fn telegram_webhook(
    cfg: &AppConfig,
    request: &FunctionRequest,
) -> Result<FunctionResponse, ServiceError> {
    if !secret_matches(
        cfg.telegram_webhook_secret.as_deref(),
        request.header(SECRET_TOKEN_HEADER),
    ) {
        return Err(ServiceError::Unauthorized("Invalid webhook secret".to_string()));
    }
    let ok = FunctionResponse::json(200, cfg, &json!({ "ok": true }));

    let update: Update = match request.json_body() {
        Ok(update) => update,
        Err(e) => {
            warn!("Unreadable bot update: {}", e);
            return Ok(ok);
        }
    };

    let client = match TelegramClient::from_config(cfg) {
        Ok(client) => client,
        Err(e) => {
            warn!("Bot update received but the bot is unavailable: {}", e);
            return Ok(ok);
        }
    };
    let handler = BotCommandHandler::from_config(
        cfg,
        std::sync::Arc::new(client),
        TieredStore::from_config(cfg)?,
    );
    if let Err(e) = handler.handle(update).await {
        tracing::error!("Bot command failed: {}", e);
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn options_preflight_is_answered_without_work() {
        let request = FunctionRequest {
            method: "OPTIONS".into(),
            ..FunctionRequest::default()
        };
        let response = invoke(Function::CreatePaymentIntent, &AppConfig::default(), request).await;
        assert_eq!(response.status, 204);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let request = FunctionRequest {
            method: "GET".into(),
            ..FunctionRequest::default()
        };
        let response = invoke(Function::Notify, &AppConfig::default(), request).await;
        assert_eq!(response.status, 405);
        assert_eq!(response.headers["Allow"], "POST");
    }

    #[tokio::test]
    async fn amount_is_checked_before_credentials() {
        let response = invoke(
            Function::CreatePaymentIntent,
            &AppConfig::default(),
            FunctionRequest::post(r#"{"amount": 0.2}"#),
        )
        .await;
        assert_eq!(response.status, 400);
        assert!(response.body.contains("INVALID_AMOUNT"));

        let response = invoke(
            Function::CreatePaymentIntent,
            &AppConfig::default(),
            FunctionRequest::post(r#"{"amount": 18.9}"#),
        )
        .await;
        assert_eq!(response.status, 503);
        assert!(response.body.contains("NOT_CONFIGURED"));
    }

    #[tokio::test]
    async fn missing_body_is_a_bad_request() {
        let response = invoke(
            Function::CreatePaymentIntent,
            &AppConfig::default(),
            FunctionRequest::default(),
        )
        .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn export_requires_the_configured_key() {
        let cfg = AppConfig {
            export_api_key: Some("k3y".into()),
            ..AppConfig::default()
        };
        let mut request = FunctionRequest {
            method: "GET".into(),
            ..FunctionRequest::default()
        };
        assert_eq!(invoke(Function::ExportOrders, &cfg, request.clone()).await.status, 401);

        request.query.insert("key".into(), "k3y".into());
        let response = invoke(Function::ExportOrders, &cfg, request).await;
        assert_eq!(response.status, 200);
        assert!(response.body.starts_with('\u{feff}'));
        assert_eq!(response.headers["Content-Type"], "text/csv; charset=utf-8");
    }

    #[test]
    fn notify_body_distinguishes_orders_from_messages() {
        let order = json!({
            "type": "order",
            "order": {
                "customer": {"name": "Dana", "email": "dana@example.com", "phone": "0501234567",
                             "city": "Haifa", "street": "Herzl 1", "zip": "3100000"},
                "items": [{"id": "mx-1", "name": "MX Bottle", "qty": 2, "price": 9.5}],
                "subtotal": 19.0, "discount": 0.0, "total": 19.0,
                "paymentMethod": "cod"
            }
        });
        let parsed: NotifyRequest = serde_json::from_value(order).unwrap();
        match parsed {
            NotifyRequest::Order { order } => assert_eq!(order.total, dec!(19)),
            other => panic!("expected an order, got {:?}", other),
        }

        let message = json!({"type": "ticket", "name": "Noa", "phone": "0529999999",
                             "subject": "Late", "message": "Where is my parcel?"});
        assert!(matches!(
            serde_json::from_value::<NotifyRequest>(message).unwrap(),
            NotifyRequest::Message(_)
        ));
    }

    #[tokio::test]
    async fn webhook_with_wrong_secret_is_unauthorized() {
        let cfg = AppConfig {
            telegram_webhook_secret: Some("s3cret".into()),
            ..AppConfig::default()
        };
        let mut request = FunctionRequest::post(r#"{"update_id": 1}"#);
        request
            .headers
            .insert("X-Telegram-Bot-Api-Secret-Token".into(), "nope".into());
        assert_eq!(invoke(Function::TelegramWebhook, &cfg, request).await.status, 401);
    }
}
