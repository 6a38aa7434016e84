use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Cancellation, OrderStore, ProductStore, ReserveOutcome, StoreError, TransitionOutcome};
use crate::domain::aggregates::{Order, OrderStatus, PaymentOutcome, Product};
use crate::inventory::{merge_lines, StockLine};

/// Product catalog held in a single map. One lock covers a whole reservation.
#[derive(Default)]
pub struct InMemoryProductStore {
    products: Mutex<HashMap<Uuid, Product>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert(&self, product: Product) {
        self.products.lock().await.insert(product.id, product);
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.products.lock().await.remove(&id).is_some()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.products.lock().await.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let products = self.products.lock().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn reserve(&self, lines: &[StockLine]) -> Result<ReserveOutcome, StoreError> {
        let mut products = self.products.lock().await;
        // Check everything before touching anything. Repeated products count against one stock level.
        let mut wanted: Vec<(Uuid, u32)> = Vec::new();
        for line in lines {
            match wanted.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, qty)) => *qty = qty.saturating_add(line.quantity),
                None => wanted.push((line.product_id, line.quantity)),
            }
        }
        for (id, qty) in &wanted {
            let Some(product) = products.get(id) else {
                return Ok(ReserveOutcome::Missing(*id));
            };
            if !product.can_reserve(*qty) {
                return Ok(ReserveOutcome::Insufficient {
                    product_id: product.id,
                    name: product.name.clone(),
                    available: product.stock.value(),
                    requested: *qty,
                });
            }
        }
        for (id, qty) in wanted {
            if let Some(product) = products.get_mut(&id) {
                product.remove_stock(qty).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(ReserveOutcome::Reserved)
    }

    async fn restore(&self, lines: &[StockLine]) -> Result<Vec<Uuid>, StoreError> {
        let mut products = self.products.lock().await;
        let mut skipped = Vec::new();
        for line in lines {
            match products.get_mut(&line.product_id) {
                Some(product) => product.add_stock(line.quantity),
                None => skipped.push(line.product_id),
            }
        }
        Ok(skipped)
    }
}

pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
    webhook_events: Mutex<HashSet<String>>,
    catalog: Arc<InMemoryProductStore>,
}

impl InMemoryOrderStore {
    /// Orders whose cancellations hand stock back to `catalog`.
    pub fn new(catalog: Arc<InMemoryProductStore>) -> Self {
        Self { orders: Mutex::default(), webhook_events: Mutex::default(), catalog }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.lock().await;
        if let Some(intent) = order.payment_intent_id.as_deref() {
            if orders.values().any(|o| o.id != order.id && o.payment_intent_id.as_deref() == Some(intent)) {
                return Err(StoreError::Conflict(format!("payment intent {intent} already used")));
            }
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.orders.lock().await.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().await.values()
            .find(|o| o.payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn transition(&self, id: Uuid, target: OrderStatus) -> Result<TransitionOutcome, StoreError> {
        let mut orders = self.orders.lock().await;
        let Some(order) = orders.get_mut(&id) else { return Ok(TransitionOutcome::NotFound) };
        let previous = order.status;
        match order.apply_status(target) {
            Ok(()) => Ok(TransitionOutcome::Applied { order: order.clone(), previous }),
            Err(_) => Ok(TransitionOutcome::Rejected(previous)),
        }
    }

    async fn set_payment_status(&self, intent_id: &str, outcome: PaymentOutcome) -> Result<Option<Order>, StoreError> {
        let mut orders = self.orders.lock().await;
        let Some(order) = orders.values_mut().find(|o| o.payment_intent_id.as_deref() == Some(intent_id)) else {
            return Ok(None);
        };
        order.record_payment(outcome);
        Ok(Some(order.clone()))
    }

    async fn cancel(&self, id: Uuid) -> Result<Option<Cancellation>, StoreError> {
        // Orders before products, and nothing awaited once both are held.
        let mut orders = self.orders.lock().await;
        let Some(lines) = orders.get(&id).map(|o| merge_lines(&o.stock_lines())) else { return Ok(None) };
        let mut products = self.catalog.products.lock().await;
        let mut skipped = Vec::new();
        for line in lines {
            match products.get_mut(&line.product_id) {
                Some(product) => product.add_stock(line.quantity),
                None => skipped.push(line.product_id),
            }
        }
        Ok(orders.remove(&id).map(|order| Cancellation { order, skipped }))
    }

    async fn record_webhook_event(&self, event_id: &str, _event_type: &str) -> Result<bool, StoreError> {
        Ok(self.webhook_events.lock().await.insert(event_id.to_string()))
    }

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), StoreError> {
        self.webhook_events.lock().await.remove(event_id);
        Ok(())
    }
}
