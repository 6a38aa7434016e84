//! Order lifecycle: checkout, status changes and the two-step cancellation.
//!
//! Checkout prices the cart from the catalog, confirms card payments with the
//! gateway, reserves stock and only then writes the order. If the write fails the
//! reservation is given back.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{
    Cart, CartError, CartItem, Order, OrderStatus, PaymentMethod, ShippingDetails,
};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::Money;
use crate::inventory::{InventoryError, InventoryService};
use crate::payment::{IntentState, PaymentError, PaymentService};
use crate::publisher::EventPublisher;
use crate::store::{OrderStore, ProductStore, StoreError, TransitionOutcome};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Payment for intent {0} has not been completed")]
    PaymentNotCompleted(String),

    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    IllegalTransition(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl OrderError {
    fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation { field: field.to_string(), message: message.into() }
    }
}

/// Checkout body. Shipping fields sit at the top level next to the cart.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    #[validate(email(message = "email is not a valid address"))]
    pub email: Option<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub payment_method: Option<String>,
    pub payment_intent_id: Option<String>,
    pub total_amount: Option<Decimal>,
}

fn required(value: &Option<String>, field: &str) -> Result<String, OrderError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(OrderError::validation(field, format!("{field} is required"))),
    }
}

impl CheckoutRequest {
    fn shipping(&self) -> Result<ShippingDetails, OrderError> {
        Ok(ShippingDetails {
            name: required(&self.name, "name")?,
            phone: required(&self.phone, "phone")?,
            region: required(&self.region, "region")?,
            district: required(&self.district, "district")?,
            city: required(&self.city, "city")?,
            address: required(&self.address, "address")?,
            email: self.email.clone().filter(|e| !e.trim().is_empty()),
            note: self.note.clone(),
        })
    }

    fn check_fields(&self) -> Result<(), OrderError> {
        if let Err(errors) = self.validate() {
            let (field, errs) = errors.field_errors().into_iter().next()
                .map(|(f, e)| (f.to_string(), e.clone()))
                .unwrap_or_else(|| ("request".to_string(), Vec::new()));
            let message = errs.first().and_then(|e| e.message.as_ref()).map(|m| m.to_string())
                .unwrap_or_else(|| format!("{field} is invalid"));
            return Err(OrderError::Validation { field, message });
        }
        if self.items.is_empty() {
            return Err(OrderError::validation("items", "at least one item is required"));
        }
        for item in &self.items {
            item.validate().map_err(|_| {
                OrderError::validation("quantity", format!("quantity for product {} must be at least 1", item.product_id))
            })?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct OrderService {
    inventory: InventoryService,
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    payments: Arc<PaymentService>,
    publisher: EventPublisher,
    delivery_charge: Money,
}

impl OrderService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        orders: Arc<dyn OrderStore>,
        payments: Arc<PaymentService>,
        publisher: EventPublisher,
        delivery_charge: Money,
    ) -> Self {
        Self { inventory: InventoryService::new(products.clone()), products, orders, payments, publisher, delivery_charge }
    }

    #[instrument(skip(self, req), fields(items = req.items.len(), payment_method = ?req.payment_method))]
    pub async fn place_order(&self, req: CheckoutRequest) -> Result<Order, OrderError> {
        let shipping = req.shipping()?;
        req.check_fields()?;
        let payment_method: PaymentMethod = req.payment_method.as_deref()
            .ok_or_else(|| OrderError::validation("paymentMethod", "paymentMethod is required"))?
            .parse()
            .map_err(|_| OrderError::validation("paymentMethod", "paymentMethod must be COD or Stripe"))?;

        let cart = Cart::new(req.items.clone());
        let catalog: HashMap<Uuid, _> = self.products.get_many(&cart.product_ids()).await?
            .into_iter().map(|p| (p.id, p)).collect();
        let lines = cart.price(&catalog).map_err(|e| match e {
            CartError::ProductMissing(id) => OrderError::Inventory(InventoryError::ProductNotFound(id)),
        })?;
        let total = Order::compute_total(&lines, self.delivery_charge);
        if let Some(claimed) = req.total_amount {
            if !total.approx_eq(claimed) {
                warn!(%claimed, computed = %total, "Checkout total mismatch");
                return Err(OrderError::validation(
                    "totalAmount",
                    format!("totalAmount {claimed} does not match computed total {total}"),
                ));
            }
        }

        let payment_intent_id = match payment_method {
            PaymentMethod::Cod => None,
            PaymentMethod::Stripe => Some(self.confirm_card_payment(req.payment_intent_id.as_deref(), total).await?),
        };

        let stock = cart.stock_lines();
        if let Err(e) = self.inventory.reserve_stock(&stock).await {
            if let Some(intent_id) = &payment_intent_id {
                error!(error = %e, %intent_id, "Card payment taken but stock reservation failed, intent needs a refund");
            }
            return Err(e.into());
        }

        let order = Order::place(shipping, lines, self.delivery_charge, payment_method, payment_intent_id);
        if let Err(e) = self.orders.insert(&order).await {
            error!(error = %e, order_id = %order.id, intent_id = ?order.payment_intent_id, "Order write failed, restoring reserved stock");
            if let Err(restore) = self.inventory.restore_stock(&stock).await {
                error!(error = %restore, order_id = %order.id, "Compensating stock restore failed");
            }
            return Err(match e {
                StoreError::Conflict(_) => OrderError::validation("paymentIntentId", "Payment intent already used by another order"),
                other => other.into(),
            });
        }

        info!(order_id = %order.id, total = %order.total_amount, "Order placed");
        self.publisher.publish(OrderEvent::Created {
            order_id: order.id,
            total: order.total_amount,
            payment_method: order.payment_method.as_str().to_string(),
        }).await;
        Ok(order)
    }

    /// A card order needs an unused intent that the gateway reports as paid for exactly `total`.
    async fn confirm_card_payment(&self, intent_id: Option<&str>, total: Money) -> Result<String, OrderError> {
        let intent_id = intent_id.map(str::trim).filter(|id| !id.is_empty())
            .ok_or_else(|| OrderError::validation("paymentIntentId", "paymentIntentId is required for card payments"))?;
        if let Some(existing) = self.orders.find_by_payment_intent(intent_id).await? {
            warn!(%intent_id, order_id = %existing.id, "Payment intent reused");
            return Err(OrderError::validation("paymentIntentId", "Payment intent already used by another order"));
        }
        let (amount_minor, currency) = match self.payments.confirm_intent(intent_id).await {
            Ok(IntentState::Succeeded { amount_minor, currency }) => (amount_minor, currency),
            Ok(state) => {
                warn!(%intent_id, ?state, "Checkout refused: payment not completed");
                return Err(OrderError::PaymentNotCompleted(intent_id.to_string()));
            }
            Err(PaymentError::Validation(message)) => return Err(OrderError::validation("paymentIntentId", message)),
            Err(e) => return Err(e.into()),
        };
        let expected = Money::to_minor_units(total.amount())
            .map_err(|e| OrderError::validation("totalAmount", e.to_string()))?;
        if amount_minor != expected || !currency.eq_ignore_ascii_case(self.payments.currency()) {
            warn!(%intent_id, amount_minor, expected, %currency, "Payment amount does not match order total");
            return Err(OrderError::validation(
                "paymentIntentId",
                format!("Payment of {} {currency} does not match order total {total}", Money::from_minor_units(amount_minor)),
            ));
        }
        Ok(intent_id.to_string())
    }

    #[instrument(skip(self))]
    pub async fn advance_status(&self, id: Uuid, status: &str) -> Result<Order, OrderError> {
        let target = OrderStatus::parse_fulfilment(status)
            .ok_or_else(|| OrderError::IllegalTransition(format!("Invalid status '{status}'")))?;
        let order = self.transition(id, target).await?;
        info!(order_id = %id, status = %order.status, "Order status updated");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn request_cancellation(&self, id: Uuid) -> Result<Order, OrderError> {
        let order = self.transition(id, OrderStatus::CancellationRequested).await?;
        info!(order_id = %id, "Cancellation requested");
        Ok(order)
    }

    async fn transition(&self, id: Uuid, target: OrderStatus) -> Result<Order, OrderError> {
        match self.orders.transition(id, target).await? {
            TransitionOutcome::Applied { order, previous } => {
                if previous != target {
                    let event = match target {
                        OrderStatus::CancellationRequested => OrderEvent::CancellationRequested { order_id: id },
                        _ => OrderEvent::StatusChanged { order_id: id, from: previous, to: target },
                    };
                    self.publisher.publish(event).await;
                }
                Ok(order)
            }
            TransitionOutcome::Rejected(current) => {
                warn!(order_id = %id, from = %current, to = %target, "Transition refused");
                Err(OrderError::IllegalTransition(format!("Order {id} is {current} and cannot become {target}")))
            }
            TransitionOutcome::NotFound => Err(OrderError::NotFound(id)),
        }
    }

    /// Deletes the order and gives its stock back in one store call, so concurrent
    /// approvals restore once and an abandoned approval changes nothing.
    #[instrument(skip(self))]
    pub async fn approve_cancellation(&self, id: Uuid) -> Result<(), OrderError> {
        let cancellation = self.orders.cancel(id).await?.ok_or(OrderError::NotFound(id))?;
        for product_id in &cancellation.skipped {
            warn!(order_id = %id, %product_id, "Product gone, stock not restored");
        }
        let restored_units: u32 = cancellation.order.stock_lines().iter()
            .filter(|l| !cancellation.skipped.contains(&l.product_id))
            .map(|l| l.quantity)
            .sum();
        info!(order_id = %id, restored_units, "Order cancelled");
        self.publisher.publish(OrderEvent::Cancelled { order_id: id, restored_units }).await;
        Ok(())
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, OrderError> {
        self.orders.get(id).await?.ok_or(OrderError::NotFound(id))
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{PaymentOutcome, Product};
    use crate::payment::{GatewayError, IntentStatus, PaymentGateway, PaymentIntent, PaymentSettings};
    use crate::store::{Cancellation, InMemoryOrderStore, InMemoryProductStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct StubGateway { intents: Mutex<HashMap<String, PaymentIntent>> }

    impl StubGateway {
        async fn paid(&self, id: &str, amount_minor: i64) {
            self.intents.lock().await.insert(id.to_string(), PaymentIntent {
                id: id.to_string(), client_secret: None, amount: amount_minor, currency: "usd".into(),
                status: IntentStatus::Succeeded, last_payment_error: None,
            });
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_intent(&self, _: i64, _: &str) -> Result<PaymentIntent, GatewayError> {
            Err(GatewayError::Decode("not used".into()))
        }
        async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, GatewayError> {
            self.intents.lock().await.get(id).cloned()
                .ok_or(GatewayError::Rejected { status: 404, message: "No such payment_intent".into() })
        }
    }

    /// Order store whose writes always fail.
    struct BrokenOrders(InMemoryOrderStore);

    #[async_trait]
    impl OrderStore for BrokenOrders {
        async fn insert(&self, _: &Order) -> Result<(), StoreError> { Err(StoreError::Unavailable("disk full".into())) }
        async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> { self.0.get(id).await }
        async fn list(&self) -> Result<Vec<Order>, StoreError> { self.0.list().await }
        async fn find_by_payment_intent(&self, i: &str) -> Result<Option<Order>, StoreError> { self.0.find_by_payment_intent(i).await }
        async fn transition(&self, id: Uuid, t: OrderStatus) -> Result<TransitionOutcome, StoreError> { self.0.transition(id, t).await }
        async fn set_payment_status(&self, i: &str, o: PaymentOutcome) -> Result<Option<Order>, StoreError> { self.0.set_payment_status(i, o).await }
        async fn cancel(&self, id: Uuid) -> Result<Option<Cancellation>, StoreError> { self.0.cancel(id).await }
        async fn record_webhook_event(&self, e: &str, t: &str) -> Result<bool, StoreError> { self.0.record_webhook_event(e, t).await }
        async fn release_webhook_event(&self, e: &str) -> Result<(), StoreError> { self.0.release_webhook_event(e).await }
    }

    struct Fixture {
        service: OrderService,
        products: Arc<InMemoryProductStore>,
        gateway: Arc<StubGateway>,
    }

    async fn fixture_with(broken_writes: bool, delivery: i64) -> Fixture {
        let products = Arc::new(InMemoryProductStore::new());
        let memory = InMemoryOrderStore::new(products.clone());
        let orders: Arc<dyn OrderStore> = if broken_writes { Arc::new(BrokenOrders(memory)) } else { Arc::new(memory) };
        let gateway = Arc::new(StubGateway::default());
        let payments = Arc::new(PaymentService::new(gateway.clone(), orders.clone(), EventPublisher::default(), PaymentSettings {
            currency: "usd".into(),
            webhook_secret: "whsec_test".into(),
            confirm_timeout: Duration::from_secs(1),
        }));
        let service = OrderService::new(products.clone(), orders, payments, EventPublisher::default(), Money::new(Decimal::new(delivery, 0)));
        Fixture { service, products, gateway }
    }

    async fn fixture() -> Fixture { fixture_with(false, 0).await }

    async fn add_product(f: &Fixture, price: i64, stock: u32) -> Uuid {
        let product = Product::new("Shirt", Money::new(Decimal::new(price, 0)), stock);
        let id = product.id;
        f.products.insert(product).await;
        id
    }

    async fn stock_of(f: &Fixture, id: Uuid) -> u32 {
        f.products.get(id).await.unwrap().unwrap().stock.value()
    }

    fn checkout(items: Vec<(Uuid, u32)>, method: &str) -> CheckoutRequest {
        CheckoutRequest {
            name: Some("Ada".into()),
            phone: Some("0123".into()),
            region: Some("North".into()),
            district: Some("Central".into()),
            city: Some("Springfield".into()),
            address: Some("1 Main St".into()),
            items: items.into_iter().map(|(product_id, quantity)| CartItem { product_id, quantity, size: None, color: None }).collect(),
            payment_method: Some(method.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cod_checkout_reserves_stock() {
        let f = fixture_with(false, 5).await;
        let product = add_product(&f, 20, 10).await;
        let order = f.service.place_order(checkout(vec![(product, 2)], "COD")).await.unwrap();

        assert_eq!(stock_of(&f, product).await, 8);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount.amount(), Decimal::new(45, 0));
        assert_eq!(f.service.get_order(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_missing_field_is_named() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;
        let mut req = checkout(vec![(product, 1)], "COD");
        req.phone = Some("  ".into());
        match f.service.place_order(req).await.unwrap_err() {
            OrderError::Validation { field, .. } => assert_eq!(field, "phone"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stock_of(&f, product).await, 10);
    }

    #[tokio::test]
    async fn test_client_total_must_match() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;
        let mut req = checkout(vec![(product, 1)], "COD");
        req.total_amount = Some(Decimal::new(1, 0));
        assert!(matches!(f.service.place_order(req).await, Err(OrderError::Validation { field, .. }) if field == "totalAmount"));

        let mut req = checkout(vec![(product, 1)], "COD");
        req.total_amount = Some(Decimal::new(20001, 3));
        assert!(f.service.place_order(req).await.is_ok());
    }

    #[tokio::test]
    async fn test_card_checkout_requires_paid_intent() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;

        let mut req = checkout(vec![(product, 1)], "Stripe");
        req.payment_intent_id = Some("pi_unpaid".into());
        assert!(matches!(f.service.place_order(req).await, Err(OrderError::PaymentNotCompleted(_))));
        assert_eq!(stock_of(&f, product).await, 10);
        assert!(f.service.list_orders().await.unwrap().is_empty());

        f.gateway.paid("pi_short", 1500).await;
        let mut req = checkout(vec![(product, 1)], "Stripe");
        req.payment_intent_id = Some("pi_short".into());
        assert!(matches!(f.service.place_order(req).await, Err(OrderError::Validation { .. })));

        f.gateway.paid("pi_paid", 2000).await;
        let mut req = checkout(vec![(product, 1)], "Stripe");
        req.payment_intent_id = Some("pi_paid".into());
        let order = f.service.place_order(req.clone()).await.unwrap();
        assert_eq!(order.payment_intent_id.as_deref(), Some("pi_paid"));

        // The same intent cannot pay for a second order.
        assert!(matches!(f.service.place_order(req).await, Err(OrderError::Validation { field, .. }) if field == "paymentIntentId"));
        assert_eq!(stock_of(&f, product).await, 9);
    }

    #[tokio::test]
    async fn test_failed_write_restores_stock() {
        let f = fixture_with(true, 0).await;
        let product = add_product(&f, 20, 10).await;
        let err = f.service.place_order(checkout(vec![(product, 3)], "COD")).await.unwrap_err();
        assert!(matches!(err, OrderError::Storage(_)));
        assert_eq!(stock_of(&f, product).await, 10);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let f = fixture().await;
        let err = f.service.place_order(checkout(vec![(Uuid::new_v4(), 1)], "COD")).await.unwrap_err();
        assert!(matches!(err, OrderError::Inventory(InventoryError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_status_changes() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;
        let order = f.service.place_order(checkout(vec![(product, 1)], "COD")).await.unwrap();

        assert_eq!(f.service.advance_status(order.id, "Shipped").await.unwrap().status, OrderStatus::Shipped);
        assert!(matches!(f.service.advance_status(order.id, "Invalid").await, Err(OrderError::IllegalTransition(_))));
        assert!(matches!(
            f.service.advance_status(order.id, "CancellationRequested").await,
            Err(OrderError::IllegalTransition(_))
        ));
        assert!(matches!(f.service.request_cancellation(order.id).await, Err(OrderError::IllegalTransition(_))));
        assert!(matches!(f.service.advance_status(Uuid::new_v4(), "Shipped").await, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancellation_flow() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;
        let order = f.service.place_order(checkout(vec![(product, 2)], "COD")).await.unwrap();
        assert_eq!(stock_of(&f, product).await, 8);

        let requested = f.service.request_cancellation(order.id).await.unwrap();
        assert_eq!(requested.status, OrderStatus::CancellationRequested);
        assert!(f.service.request_cancellation(order.id).await.is_ok());

        f.service.approve_cancellation(order.id).await.unwrap();
        assert_eq!(stock_of(&f, product).await, 10);
        assert!(matches!(f.service.get_order(order.id).await, Err(OrderError::NotFound(_))));
        assert!(matches!(f.service.approve_cancellation(order.id).await, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_approvals_restore_once() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;
        let order = f.service.place_order(checkout(vec![(product, 3), (product, 1)], "COD")).await.unwrap();
        assert_eq!(stock_of(&f, product).await, 6);

        let (a, b) = tokio::join!(f.service.approve_cancellation(order.id), f.service.approve_cancellation(order.id));
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(stock_of(&f, product).await, 10);
    }

    #[tokio::test]
    async fn test_paid_order_without_stock_is_refused() {
        let f = fixture().await;
        let product = add_product(&f, 20, 1).await;
        f.gateway.paid("pi_paid", 4000).await;
        let mut req = checkout(vec![(product, 2)], "Stripe");
        req.payment_intent_id = Some("pi_paid".into());

        let err = f.service.place_order(req).await.unwrap_err();
        assert!(matches!(err, OrderError::Inventory(InventoryError::InsufficientStock { available: 1, requested: 2, .. })));
        assert_eq!(stock_of(&f, product).await, 1);
        assert!(f.service.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declined_cancellation_returns_to_fulfilment() {
        let f = fixture().await;
        let product = add_product(&f, 20, 10).await;
        let order = f.service.place_order(checkout(vec![(product, 1)], "COD")).await.unwrap();
        f.service.request_cancellation(order.id).await.unwrap();
        assert_eq!(f.service.advance_status(order.id, "Confirm").await.unwrap().status, OrderStatus::Confirm);
    }
}
