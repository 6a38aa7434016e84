//! Inventory reservation.
//!
//! Stock leaves the catalog only through [`InventoryService::reserve_stock`]. It comes
//! back through [`InventoryService::restore_stock`] when a checkout write fails, or
//! inside `OrderStore::cancel` together with the order's deletion.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::store::{ProductStore, ReserveOutcome, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Folds lines for the same product into one, keeping first-seen order.
pub fn merge_lines(lines: &[StockLine]) -> Vec<StockLine> {
    let mut merged: Vec<StockLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(*line),
        }
    }
    merged
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for {name}: {available} available, {requested} requested")]
    InsufficientStock { product_id: Uuid, name: String, available: u32, requested: u32 },

    #[error("Quantity for product {0} must be at least 1")]
    InvalidQuantity(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct InventoryService {
    products: Arc<dyn ProductStore>,
}

impl InventoryService {
    pub fn new(products: Arc<dyn ProductStore>) -> Self { Self { products } }

    /// Takes stock for every line, or for none of them. Lines naming the same
    /// product are checked as one.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn reserve_stock(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        if let Some(bad) = lines.iter().find(|l| l.quantity == 0) {
            return Err(InventoryError::InvalidQuantity(bad.product_id));
        }
        let lines = merge_lines(lines);
        match self.products.reserve(&lines).await? {
            ReserveOutcome::Reserved => {
                info!(units = lines.iter().map(|l| l.quantity).sum::<u32>(), "Stock reserved");
                Ok(())
            }
            ReserveOutcome::Missing(id) => {
                warn!(product_id = %id, "Reservation refused: product not found");
                Err(InventoryError::ProductNotFound(id))
            }
            ReserveOutcome::Insufficient { product_id, name, available, requested } => {
                warn!(%product_id, available, requested, "Reservation refused: insufficient stock");
                Err(InventoryError::InsufficientStock { product_id, name, available, requested })
            }
        }
    }

    /// Puts stock back. Products deleted since the reservation are skipped.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn restore_stock(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        let skipped = self.products.restore(lines).await?;
        for id in &skipped {
            warn!(product_id = %id, "Stock not restored: product no longer exists");
        }
        info!(restored = lines.len() - skipped.len(), skipped = skipped.len(), "Stock restored");
        Ok(())
    }
}
