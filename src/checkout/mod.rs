//! Checkout state machine driving intent creation, confirmation and the
//! cash-on-delivery branch.
//!
//! ```text
//! CollectingInfo -> CreatingIntent -> AwaitingConfirmation -> Success | Failure
//! CollectingInfo -> Processing (cod) -> Success
//! Failure --retry--> CollectingInfo
//! ```
//!
//! A confirmed payment always ends in `Success`; notification runs on its own
//! task and never feeds back into the state.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{generate_order_number, Customer, DeliveryOutcome, Order, OrderStatus, PaymentMethod};
use crate::notifications::OrderNotifier;
use crate::payments::intent::IntentCustomer;
use crate::payments::stripe::intent_id_from_client_secret;
use crate::payments::{
    CreatePaymentIntentRequest, PaymentIntentCreated, PaymentIntentService, StripePaymentProcessor,
};

pub mod cart;

pub use cart::{Cart, CartTotals};

/// Creates the payment intent for a checkout attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntentCreator: Send + Sync {
    async fn create_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntentCreated, ServiceError>;
}

#[async_trait]
impl IntentCreator for PaymentIntentService {
    async fn create_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntentCreated, ServiceError> {
        self.create(request).await
    }
}

/// The processor's hosted confirmation step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentConfirmer: Send + Sync {
    async fn confirm(&self, client_secret: &str) -> Result<(), ServiceError>;
}

/// Confirms server-side with a fixed payment method, e.g. `pm_card_visa` in test mode.
pub struct ProcessorConfirmer {
    processor: StripePaymentProcessor,
    payment_method: String,
}

impl ProcessorConfirmer {
    pub fn new(processor: StripePaymentProcessor, payment_method: impl Into<String>) -> Self {
        Self {
            processor,
            payment_method: payment_method.into(),
        }
    }
}

#[async_trait]
impl PaymentConfirmer for ProcessorConfirmer {
    async fn confirm(&self, client_secret: &str) -> Result<(), ServiceError> {
        let id = intent_id_from_client_secret(client_secret).ok_or_else(|| {
            ServiceError::ValidationError("Malformed payment client secret".to_string())
        })?;
        self.processor
            .confirm_payment_intent(id, &self.payment_method)
            .await
            .map(|_| ())
    }
}

/// Why the last attempt failed, as shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutFailure {
    pub code: &'static str,
    pub message: String,
    /// The same intent may be reused when the failure was transient
    pub transient: bool,
    /// Whether another attempt can succeed without a configuration change
    pub retryable: bool,
}

impl From<&ServiceError> for CheckoutFailure {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.error_code(),
            message: err.response_message(),
            transient: matches!(err, ServiceError::NetworkError(_)),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutState {
    CollectingInfo,
    CreatingIntent,
    AwaitingConfirmation {
        client_secret: String,
        payment_intent_id: String,
    },
    /// Cash-on-delivery processing delay
    Processing,
    Success {
        order: Order,
    },
    Failure(CheckoutFailure),
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::CollectingInfo => "collecting-info",
            CheckoutState::CreatingIntent => "creating-intent",
            CheckoutState::AwaitingConfirmation { .. } => "awaiting-confirmation",
            CheckoutState::Processing => "processing",
            CheckoutState::Success { .. } => "success",
            CheckoutState::Failure(_) => "failure",
        }
    }
}

/// Collaborators shared by every checkout.
#[derive(Clone)]
pub struct CheckoutDeps {
    pub intents: Arc<dyn IntentCreator>,
    pub confirmer: Arc<dyn PaymentConfirmer>,
    pub notifier: Option<OrderNotifier>,
    pub currency: String,
    pub cod_delay: Duration,
}

/// One customer's checkout. Entered data survives failures.
pub struct CheckoutFlow {
    deps: CheckoutDeps,
    cart: Cart,
    customer: Customer,
    payment_method: PaymentMethod,
    state: CheckoutState,
    idempotency_key: String,
    notification: Option<JoinHandle<DeliveryOutcome>>,
}

impl CheckoutFlow {
    pub fn new(deps: CheckoutDeps, cart: Cart) -> Self {
        Self {
            deps,
            cart,
            customer: Customer::default(),
            payment_method: PaymentMethod::Card,
            state: CheckoutState::CollectingInfo,
            idempotency_key: Uuid::new_v4().to_string(),
            notification: None,
        }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> Result<&mut Cart, ServiceError> {
        self.ensure_collecting()?;
        Ok(&mut self.cart)
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn fill_customer(&mut self, customer: Customer) -> Result<(), ServiceError> {
        self.ensure_collecting()?;
        self.customer = customer;
        Ok(())
    }

    pub fn select_payment_method(&mut self, method: PaymentMethod) -> Result<(), ServiceError> {
        self.ensure_collecting()?;
        self.payment_method = method;
        Ok(())
    }

    /// Validates the form and moves on. Invalid input keeps the flow in `CollectingInfo`.
    #[instrument(skip(self), fields(payment_method = %self.payment_method))]
    pub async fn submit(&mut self) -> Result<&CheckoutState, ServiceError> {
        self.ensure_collecting()?;
        self.customer.validate()?;
        let totals = self.cart.ensure_payable()?;

        match self.payment_method {
            PaymentMethod::Card => self.create_intent(totals).await,
            PaymentMethod::Cod => self.process_cod(totals).await,
        }
        Ok(&self.state)
    }

    /// Runs the hosted confirmation for the intent created by [`submit`](Self::submit).
    #[instrument(skip(self))]
    pub async fn confirm_payment(&mut self) -> Result<&CheckoutState, ServiceError> {
        let (client_secret, payment_intent_id) = match &self.state {
            CheckoutState::AwaitingConfirmation {
                client_secret,
                payment_intent_id,
            } => (client_secret.clone(), payment_intent_id.clone()),
            other => return Err(invalid_transition("confirm payment", other)),
        };
        let totals = self.cart.totals()?;

        match self.deps.confirmer.confirm(&client_secret).await {
            Ok(()) => self.finish(PaymentMethod::Card, Some(payment_intent_id), totals),
            Err(e) => {
                warn!(%payment_intent_id, "Payment confirmation failed: {}", e);
                self.state = CheckoutState::Failure(CheckoutFailure::from(&e));
            }
        }
        Ok(&self.state)
    }

    /// Submit and, for card payments, confirm.
    pub async fn complete(&mut self) -> Result<&CheckoutState, ServiceError> {
        self.submit().await?;
        if matches!(self.state, CheckoutState::AwaitingConfirmation { .. }) {
            self.confirm_payment().await?;
        }
        Ok(&self.state)
    }

    /// Back to `CollectingInfo` with every field still filled in.
    ///
    /// The idempotency key survives transient failures so a timed-out intent
    /// creation is not duplicated; any other failure starts a new attempt.
    pub fn retry(&mut self) -> Result<(), ServiceError> {
        let CheckoutState::Failure(failure) = &self.state else {
            return Err(invalid_transition("retry", &self.state));
        };
        if !failure.transient {
            self.idempotency_key = Uuid::new_v4().to_string();
        }
        self.state = CheckoutState::CollectingInfo;
        Ok(())
    }

    /// Handle of the background notification started on success.
    pub fn take_notification(&mut self) -> Option<JoinHandle<DeliveryOutcome>> {
        self.notification.take()
    }

    async fn create_intent(&mut self, totals: CartTotals) {
        self.state = CheckoutState::CreatingIntent;
        let mut metadata = BTreeMap::new();
        if let Some(promo) = self.cart.promo() {
            metadata.insert("promo_code".to_string(), promo.code.clone());
        }

        let request = CreatePaymentIntentRequest {
            amount: totals.total,
            currency: Some(self.deps.currency.clone()),
            metadata,
            customer: Some(IntentCustomer {
                name: Some(self.customer.name.clone()),
                email: Some(self.customer.email.clone()),
            }),
            items: self.cart.summaries(),
            idempotency_key: Some(self.idempotency_key.clone()),
        };

        self.state = match self.deps.intents.create_intent(request).await {
            Ok(created) => CheckoutState::AwaitingConfirmation {
                client_secret: created.client_secret,
                payment_intent_id: created.payment_intent_id,
            },
            Err(e) => {
                warn!("Payment intent creation failed: {}", e);
                CheckoutState::Failure(CheckoutFailure::from(&e))
            }
        };
    }

    async fn process_cod(&mut self, totals: CartTotals) {
        self.state = CheckoutState::Processing;
        tokio::time::sleep(self.deps.cod_delay).await;
        self.finish(PaymentMethod::Cod, None, totals);
    }

    fn finish(
        &mut self,
        payment_method: PaymentMethod,
        payment_intent_id: Option<String>,
        totals: CartTotals,
    ) {
        let now = Utc::now();
        let order = Order {
            order_number: generate_order_number(now),
            customer: self.customer.clone(),
            items: self.cart.items().to_vec(),
            subtotal: totals.subtotal,
            discount: totals.discount,
            promo_code: self.cart.promo().map(|p| p.code.clone()),
            total: totals.total,
            payment_method,
            status: OrderStatus::Pending,
            payment_intent_id,
            created_at: now,
        };

        info!(order_number = %order.order_number, %payment_method, "Checkout confirmed");
        if let Some(notifier) = &self.deps.notifier {
            self.notification = Some(notifier.spawn_order(order.clone()));
        }
        self.state = CheckoutState::Success { order };
    }

    fn ensure_collecting(&self) -> Result<(), ServiceError> {
        match &self.state {
            CheckoutState::CollectingInfo => Ok(()),
            other => Err(invalid_transition("edit checkout", other)),
        }
    }
}

fn invalid_transition(action: &str, state: &CheckoutState) -> ServiceError {
    ServiceError::BadRequest(format!("Cannot {} while {}", action, state.name()))
}
