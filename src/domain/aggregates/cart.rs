//! Cart Aggregate
//!
//! The basket submitted at checkout, priced against the catalog rather than
//! against whatever the client claims.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{LineItem, Product};
use crate::domain::value_objects::Money;
use crate::inventory::{merge_lines, StockLine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new(items: Vec<CartItem>) -> Self { Self { items } }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn product_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.items.iter().map(|i| i.product_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// One stock line per product. The same product in two sizes is one reservation.
    pub fn stock_lines(&self) -> Vec<StockLine> {
        let lines: Vec<StockLine> = self.items.iter()
            .map(|i| StockLine { product_id: i.product_id, quantity: i.quantity })
            .collect();
        merge_lines(&lines)
    }

    /// Snapshots each line from the catalog, keeping the customer's size and color.
    pub fn price(&self, catalog: &HashMap<Uuid, Product>) -> Result<Vec<LineItem>, CartError> {
        self.items.iter().map(|item| {
            let product = catalog.get(&item.product_id).ok_or(CartError::ProductMissing(item.product_id))?;
            Ok(LineItem {
                product_id: product.id,
                name: product.name.clone(),
                image: product.image.clone(),
                description: product.description.clone(),
                price: product.price,
                discount: product.discount,
                quantity: item.quantity,
                size: item.size.clone(),
                color: item.color.clone(),
                product_code: product.product_code.clone(),
            })
        }).collect()
    }

    pub fn subtotal(lines: &[LineItem]) -> Money {
        lines.iter().fold(Money::ZERO, |acc, l| acc.add(l.line_total()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ProductMissing(Uuid) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::ProductMissing(id) => write!(f, "Product {} not found", id) }
    }
}
