//! MX Storefront backend
//!
//! Payment intents, order and message notifications, promo codes and CSV
//! exports for a single-product storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod bot;
pub mod checkout;
pub mod config;
pub mod errors;
pub mod export;
pub mod functions;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod store;
pub mod tracing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer};
use utoipa::ToSchema;

use crate::bot::BotCommandHandler;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::notifications::{OrderNotifier, TelegramClient};
use crate::payments::PaymentIntentService;
use crate::store::TieredStore;

/// Time left to the handler after the processor call returns.
const REQUEST_TIMEOUT_HEADROOM: Duration = Duration::from_secs(1);

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub payments: PaymentIntentService,
    pub store: TieredStore,
    pub notifier: OrderNotifier,
    /// Present only when a bot token is configured
    pub bot_commands: Option<BotCommandHandler>,
}

impl AppState {
    /// Missing credentials disable the matching integration; they never fail startup.
    pub fn from_config(config: AppConfig) -> Result<Self, ServiceError> {
        let store = TieredStore::from_config(&config)?;
        let payments = PaymentIntentService::from_config(&config)?;
        let notifier = OrderNotifier::from_config(&config, store.clone());
        let bot_commands = match TelegramClient::from_config(&config) {
            Ok(client) => Some(BotCommandHandler::from_config(
                &config,
                Arc::new(client),
                store.clone(),
            )),
            Err(ServiceError::NotConfigured(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            config: Arc::new(config),
            payments,
            store,
            notifier,
            bot_commands,
        })
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn request_timeout_outlasts_processor_retries() {
        let cfg = AppConfig {
            http_timeout_secs: 15,
            stripe_max_network_retries: 2,
            ..AppConfig::default()
        };
        assert_eq!(request_timeout(&cfg), Duration::from_millis(46_750));
    }

    #[test]
    fn response_outside_a_request_has_no_request_id() {
        let response = ApiResponse::success(1).with_message("accepted");
        assert_eq!(response.message.as_deref(), Some("accepted"));
        assert!(response.meta.expect("metadata expected").request_id.is_none());
    }
}

/// Routes under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/create-payment-intent",
            post(handlers::payments::create_payment_intent),
        )
        .route("/orders", post(handlers::orders::submit_order))
        .route(
            "/orders/:order_number/delivery",
            get(handlers::orders::order_delivery),
        )
        .route("/notify", post(handlers::notifications::notify))
        .route("/promo-codes/:code", get(handlers::promo::get_promo_code))
        .route("/export-orders", get(handlers::export::export_orders))
        .route("/export-messages", get(handlers::export::export_messages))
        .route("/telegram-webhook", post(handlers::telegram::telegram_webhook))
}

/// Full application with its middleware stack
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = request_timeout(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api", api_routes())
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}

/// Long enough for a processor call that exhausts its network retries.
pub fn request_timeout(cfg: &AppConfig) -> Duration {
    payments::stripe::max_call_duration(cfg.http_timeout(), cfg.stripe_max_network_retries)
        + REQUEST_TIMEOUT_HEADROOM
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else if cfg.is_development() {
        ::tracing::info!("Using permissive CORS because no origins are configured in development");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("cors_allowed_origins is not set; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::errors::{ErrorResponse, ServiceError};
    pub use crate::{build_app, ApiResponse, AppState};
}
