//! Product Aggregate
//!
//! Catalog editing lives elsewhere; the order core only reads prices and moves stock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub product_code: Option<String>,
    pub price: Money,
    /// Percentage off the list price, 0 to 100.
    pub discount: Decimal,
    pub stock: Quantity,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.into(), image: None, description: None, product_code: None,
            price, discount: Decimal::ZERO, stock: Quantity::new(stock),
        }
    }

    pub fn with_discount(mut self, percent: Decimal) -> Self { self.discount = percent; self }
    pub fn with_code(mut self, code: impl Into<String>) -> Self { self.product_code = Some(code.into()); self }

    pub fn unit_price(&self) -> Money { self.price.discounted(self.discount) }
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }
    pub fn can_reserve(&self, qty: u32) -> bool { self.stock.subtract(qty).is_some() }

    pub fn remove_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.subtract(qty).ok_or(ProductError::InsufficientStock { available: self.stock.value() })?;
        Ok(())
    }

    pub fn add_stock(&mut self, qty: u32) { self.stock = self.stock.add(qty); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InsufficientStock { available: u32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::InsufficientStock { available } => write!(f, "Insufficient stock, {} available", available) }
    }
}
