//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentOutcome};
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, total: Money, payment_method: String },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    CancellationRequested { order_id: Uuid },
    Cancelled { order_id: Uuid, restored_units: u32 },
    Payment { order_id: Uuid, payment_intent_id: String, outcome: PaymentOutcome },
}

impl OrderEvent {
    /// Subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::StatusChanged { .. } => "orders.status_changed",
            Self::CancellationRequested { .. } => "orders.cancellation_requested",
            Self::Cancelled { .. } => "orders.cancelled",
            Self::Payment { outcome: PaymentOutcome::PaymentSucceeded, .. } => "orders.payment_succeeded",
            Self::Payment { outcome: PaymentOutcome::PaymentFailed, .. } => "orders.payment_failed",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::CancellationRequested { order_id }
            | Self::Cancelled { order_id, .. }
            | Self::Payment { order_id, .. } => *order_id,
        }
    }
}
