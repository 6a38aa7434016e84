#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_orders::domain::value_objects::Money;
use storefront_orders::payment::{GatewayError, IntentStatus, PaymentIntent};
use storefront_orders::store::{InMemoryOrderStore, InMemoryProductStore, ProductStore};
use storefront_orders::{
    router, AppState, EventPublisher, OrderService, PaymentGateway, PaymentService, PaymentSettings, Product,
};

pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Gateway that keeps intents in memory. Tests flip them to succeeded.
#[derive(Default)]
pub struct FakeGateway {
    pub intents: Mutex<HashMap<String, PaymentIntent>>,
    pub counter: Mutex<u32>,
    pub fail_create: bool,
}

impl FakeGateway {
    pub async fn succeed(&self, intent_id: &str) {
        if let Some(intent) = self.intents.lock().await.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, amount_minor: i64, currency: &str) -> Result<PaymentIntent, GatewayError> {
        if self.fail_create {
            return Err(GatewayError::Rejected { status: 402, message: "Your card was declined.".into() });
        }
        let mut counter = self.counter.lock().await;
        *counter += 1;
        let id = format!("pi_test{}", *counter);
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret_abc")),
            amount: amount_minor,
            currency: currency.to_string(),
            status: IntentStatus::RequiresPaymentMethod,
            last_payment_error: None,
        };
        self.intents.lock().await.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        self.intents.lock().await.get(intent_id).cloned()
            .ok_or(GatewayError::Rejected { status: 404, message: format!("No such payment_intent: '{intent_id}'") })
    }
}

pub struct TestApp {
    pub router: Router,
    pub products: Arc<InMemoryProductStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub gateway: Arc<FakeGateway>,
    pub publisher: EventPublisher,
}

impl TestApp {
    pub fn new() -> Self { Self::with_gateway(FakeGateway::default()) }

    pub fn with_gateway(gateway: FakeGateway) -> Self {
        let products = Arc::new(InMemoryProductStore::new());
        let orders = Arc::new(InMemoryOrderStore::new(products.clone()));
        let gateway = Arc::new(gateway);
        let publisher = EventPublisher::default();
        let payments = Arc::new(PaymentService::new(gateway.clone(), orders.clone(), publisher.clone(), PaymentSettings {
            currency: "usd".into(),
            webhook_secret: WEBHOOK_SECRET.into(),
            confirm_timeout: Duration::from_secs(2),
        }));
        let service = OrderService::new(products.clone(), orders.clone(), payments.clone(), publisher.clone(), Money::ZERO);
        let router = router(AppState { orders: service, payments });
        Self { router, products, orders, gateway, publisher }
    }

    pub async fn add_product(&self, name: &str, price: Decimal, stock: u32) -> Uuid {
        let product = Product::new(name, Money::new(price), stock);
        let id = product.id;
        self.products.insert(product).await;
        id
    }

    pub async fn stock_of(&self, id: Uuid) -> u32 {
        self.products.get(id).await.unwrap().unwrap().stock.value()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    pub async fn json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Request::builder().method(method).uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn call(&self, method: &str, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()).await
    }
}

pub fn checkout_body(items: &[(Uuid, u32)], payment_method: &str) -> Value {
    serde_json::json!({
        "name": "Ada Lovelace",
        "phone": "+44 20 7946 0000",
        "region": "Greater London",
        "district": "Camden",
        "city": "London",
        "address": "12 St Pancras Way",
        "email": "ada@example.com",
        "items": items.iter().map(|(id, qty)| serde_json::json!({"productId": id, "quantity": qty})).collect::<Vec<_>>(),
        "paymentMethod": payment_method,
    })
}
