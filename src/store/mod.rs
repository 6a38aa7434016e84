//! Persistence seams for products and orders.
//!
//! Both traits have a Postgres implementation for the running service and an
//! in-memory one used by tests and local runs without a database.

mod memory;
mod postgres;

pub use memory::{InMemoryOrderStore, InMemoryProductStore};
pub use postgres::{PgOrderStore, PgProductStore};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, PaymentOutcome, Product};
use crate::inventory::StockLine;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("conflicting record: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an all-or-nothing stock reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Missing(Uuid),
    Insufficient { product_id: Uuid, name: String, available: u32, requested: u32 },
}

/// An order deleted by an approved cancellation. `skipped` lists products that no
/// longer exist, so their stock could not be returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub order: Order,
    pub skipped: Vec<Uuid>,
}

/// Result of a conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied { order: Order, previous: OrderStatus },
    Rejected(OrderStatus),
    NotFound,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError>;

    /// Decrements every line or none of them. Implementations must serialize
    /// against concurrent reservations on the same products.
    async fn reserve(&self, lines: &[StockLine]) -> Result<ReserveOutcome, StoreError>;

    /// Increments every line whose product still exists. Returns the ids that were skipped.
    async fn restore(&self, lines: &[StockLine]) -> Result<Vec<Uuid>, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with `Conflict` if another order already holds the same payment intent.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError>;

    /// Sets `target` only if the current status is one of `OrderStatus::allowed_sources(target)`.
    async fn transition(&self, id: Uuid, target: OrderStatus) -> Result<TransitionOutcome, StoreError>;

    async fn set_payment_status(&self, intent_id: &str, outcome: PaymentOutcome) -> Result<Option<Order>, StoreError>;

    /// Returns the order's stock to the catalog, then deletes the order, as one unit.
    /// Only one of several concurrent callers gets `Some`. An abandoned call keeps neither change.
    async fn cancel(&self, id: Uuid) -> Result<Option<Cancellation>, StoreError>;

    /// Records a webhook event id. Returns false if it was already recorded.
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, StoreError>;

    /// Forgets a recorded event so the gateway's retry is processed again.
    async fn release_webhook_event(&self, event_id: &str) -> Result<(), StoreError>;
}
