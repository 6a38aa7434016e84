//! Payment coordination with the card processor.
//!
//! The gateway is injected as a [`PaymentGateway`] so tests can stand in for Stripe.
//! Webhook reconciliation only ever writes the order's payment marker; fulfilment
//! status stays with the order lifecycle.

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::PaymentOutcome;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, MoneyError};
use crate::publisher::EventPublisher;
use crate::store::{OrderStore, StoreError};
use webhook::{verify_signature, SignatureError, WebhookEvent};

pub use stripe::StripeGateway;

pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected payment gateway response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Webhook signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, amount_minor: i64, currency: &str) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntent {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// Where a card payment stands, as far as checkout is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentState {
    Succeeded { amount_minor: i64, currency: String },
    Pending,
    Failed,
}

impl From<&PaymentIntent> for IntentState {
    fn from(intent: &PaymentIntent) -> Self {
        match intent.status {
            IntentStatus::Succeeded => IntentState::Succeeded { amount_minor: intent.amount, currency: intent.currency.clone() },
            IntentStatus::Canceled => IntentState::Failed,
            IntentStatus::RequiresPaymentMethod if intent.last_payment_error.is_some() => IntentState::Failed,
            _ => IntentState::Pending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { order_id: Uuid, outcome: PaymentOutcome },
    Duplicate,
    UnknownIntent(String),
    Ignored(String),
}

#[derive(Clone, Debug)]
pub struct PaymentSettings {
    pub currency: String,
    pub webhook_secret: String,
    pub confirm_timeout: Duration,
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderStore>,
    publisher: EventPublisher,
    settings: PaymentSettings,
}

/// Stripe ids are `pi_` followed by alphanumerics; anything else never reaches a URL.
pub fn is_valid_intent_id(id: &str) -> bool {
    match id.strip_prefix("pi_") {
        Some(rest) => !rest.is_empty() && id.len() <= 255 && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false,
    }
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderStore>,
        publisher: EventPublisher,
        settings: PaymentSettings,
    ) -> Self {
        Self { gateway, orders, publisher, settings }
    }

    pub fn currency(&self) -> &str { &self.settings.currency }

    #[instrument(skip(self))]
    pub async fn create_intent(&self, amount: Decimal, currency: Option<&str>) -> Result<CreatedIntent, PaymentError> {
        let amount_minor = Money::to_minor_units(amount).map_err(|e: MoneyError| PaymentError::Validation(format!("Invalid amount: {e}")))?;
        let currency = currency.unwrap_or(&self.settings.currency).to_ascii_lowercase();
        let intent = self.gateway.create_intent(amount_minor, &currency).await.map_err(|e| {
            error!(error = %e, amount_minor, "Payment intent creation failed");
            PaymentError::Gateway(e)
        })?;
        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            error!(intent_id = %intent.id, "Payment intent returned without client secret");
            PaymentError::Gateway(GatewayError::Decode("missing client_secret".into()))
        })?;
        info!(intent_id = %intent.id, amount_minor, %currency, "Payment intent created");
        Ok(CreatedIntent { client_secret, payment_intent_id: intent.id })
    }

    /// Asks the gateway whether the intent has been paid. A slow gateway counts as pending.
    #[instrument(skip(self))]
    pub async fn confirm_intent(&self, intent_id: &str) -> Result<IntentState, PaymentError> {
        if !is_valid_intent_id(intent_id) {
            return Err(PaymentError::Validation(format!("Invalid payment intent id '{intent_id}'")));
        }
        let lookup = tokio::time::timeout(self.settings.confirm_timeout, self.gateway.retrieve_intent(intent_id)).await;
        let state = match lookup {
            Err(_) => {
                warn!(timeout = ?self.settings.confirm_timeout, "Payment intent lookup timed out");
                IntentState::Pending
            }
            Ok(Ok(intent)) => IntentState::from(&intent),
            Ok(Err(GatewayError::Rejected { status: 404, .. })) => {
                warn!("Payment intent unknown to gateway");
                IntentState::Failed
            }
            Ok(Err(e)) => {
                error!(error = %e, "Payment intent lookup failed");
                return Err(e.into());
            }
        };
        info!(state = ?state, "Payment intent checked");
        Ok(state)
    }

    /// Applies a signed gateway notification. Replays and unknown intents are acknowledged
    /// without touching any order.
    #[instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn reconcile_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, PaymentError> {
        let signature = signature.ok_or_else(|| {
            warn!("Webhook without Stripe-Signature header");
            PaymentError::InvalidSignature("missing Stripe-Signature header".into())
        })?;
        verify_signature(payload, signature, &self.settings.webhook_secret, Utc::now().timestamp())
            .map_err(|e: SignatureError| {
                warn!(error = %e, "Webhook signature verification failed");
                PaymentError::InvalidSignature(e.to_string())
            })?;

        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            warn!(error = %e, "Failed to parse webhook JSON");
            PaymentError::MalformedEvent(e.to_string())
        })?;
        info!(event_id = %event.id, event_type = %event.event_type, "Received payment webhook");

        let outcome = match event.event_type.as_str() {
            EVENT_SUCCEEDED => PaymentOutcome::PaymentSucceeded,
            EVENT_FAILED => PaymentOutcome::PaymentFailed,
            other => return Ok(WebhookOutcome::Ignored(other.to_string())),
        };
        let Some(intent_id) = event.payment_intent_id().map(str::to_string) else {
            warn!(event_id = %event.id, "Payment event without intent id");
            return Ok(WebhookOutcome::Ignored(event.event_type));
        };

        if !self.orders.record_webhook_event(&event.id, &event.event_type).await? {
            info!(event_id = %event.id, "Duplicate webhook event, skipping");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.orders.set_payment_status(&intent_id, outcome).await {
            Ok(Some(order)) => {
                info!(order_id = %order.id, %intent_id, outcome = outcome.as_str(), "Order payment reconciled");
                self.publisher.publish(OrderEvent::Payment { order_id: order.id, payment_intent_id: intent_id, outcome }).await;
                Ok(WebhookOutcome::Applied { order_id: order.id, outcome })
            }
            Ok(None) => {
                // Not claimed, so a retry after checkout still lands on the order.
                info!(%intent_id, "No order for payment intent, acknowledging");
                if let Err(e) = self.orders.release_webhook_event(&event.id).await {
                    warn!(error = %e, event_id = %event.id, "Failed to release webhook event");
                }
                Ok(WebhookOutcome::UnknownIntent(intent_id))
            }
            Err(e) => {
                error!(error = %e, event_id = %event.id, "Failed to apply webhook, releasing event for retry");
                if let Err(release) = self.orders.release_webhook_event(&event.id).await {
                    error!(error = %release, event_id = %event.id, "Failed to release webhook event");
                }
                Err(e.into())
            }
        }
    }
}
