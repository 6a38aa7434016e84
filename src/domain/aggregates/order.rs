//! Order Aggregate
//!
//! Line items are snapshots of the catalog taken at checkout. They never point
//! back at live product rows, so an order stays readable after the product is
//! edited or deleted.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::inventory::StockLine;

/// Days between placement and the promised delivery date.
pub const DELIVERY_ESTIMATE_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub items: Vec<LineItem>,
    pub shipping: ShippingDetails,
    pub delivery_charge: Money,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_intent_id: Option<String>,
    pub payment_status: Option<PaymentOutcome>,
    pub estimated_delivery_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub price: Money,
    pub discount: Decimal,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub product_code: Option<String>,
}

impl LineItem {
    pub fn unit_price(&self) -> Money { self.price.discounted(self.discount) }
    pub fn line_total(&self) -> Money { self.unit_price().multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    pub name: String,
    pub phone: String,
    pub region: String,
    pub district: String,
    pub city: String,
    pub address: String,
    pub email: Option<String>,
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus { #[default] Pending, Confirm, Shipped, Delivered, CancellationRequested }

const FULFILMENT: [OrderStatus; 4] = [OrderStatus::Pending, OrderStatus::Confirm, OrderStatus::Shipped, OrderStatus::Delivered];
const ANY: [OrderStatus; 5] = [
    OrderStatus::Pending, OrderStatus::Confirm, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::CancellationRequested,
];
const CANCELLABLE: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Confirm, OrderStatus::CancellationRequested];

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirm => "Confirm",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::CancellationRequested => "CancellationRequested",
        }
    }

    /// Statuses an admin may set directly. Any of them may follow any other.
    pub fn fulfilment() -> &'static [OrderStatus] { &FULFILMENT }

    /// Statuses an order must currently hold for `target` to be applied.
    pub fn allowed_sources(target: OrderStatus) -> &'static [OrderStatus] {
        match target {
            Self::CancellationRequested => &CANCELLABLE,
            _ => &ANY,
        }
    }

    pub fn can_become(&self, target: OrderStatus) -> bool { Self::allowed_sources(target).contains(self) }

    /// Parses an admin-supplied status, refusing anything outside the fulfilment sequence.
    pub fn parse_fulfilment(value: &str) -> Option<OrderStatus> {
        value.parse::<OrderStatus>().ok().filter(|s| FULFILMENT.contains(s))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ANY.into_iter().find(|v| v.as_str() == s).ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod { #[serde(rename = "COD")] Cod, Stripe }

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str { match self { Self::Cod => "COD", Self::Stripe => "Stripe" } }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "COD" => Ok(Self::Cod), "Stripe" => Ok(Self::Stripe), other => Err(UnknownVariant(other.to_string())) }
    }
}

/// Card payment marker written by webhook reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentOutcome { PaymentSucceeded, PaymentFailed }

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self { Self::PaymentSucceeded => "PaymentSucceeded", Self::PaymentFailed => "PaymentFailed" }
    }
}

impl FromStr for PaymentOutcome {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PaymentSucceeded" => Ok(Self::PaymentSucceeded),
            "PaymentFailed" => Ok(Self::PaymentFailed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownVariant(pub String);
impl std::error::Error for UnknownVariant {}
impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown value '{}'", self.0) }
}

impl Order {
    /// Builds a new pending order. The total is always derived from the snapshots.
    /// A card order is only placed once its intent has succeeded, so it starts paid.
    pub fn place(
        shipping: ShippingDetails,
        items: Vec<LineItem>,
        delivery_charge: Money,
        payment_method: PaymentMethod,
        payment_intent_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let total_amount = Self::compute_total(&items, delivery_charge);
        let payment_status = payment_intent_id.as_ref().map(|_| PaymentOutcome::PaymentSucceeded);
        Self {
            id: Uuid::now_v7(), items, shipping, delivery_charge, total_amount,
            status: OrderStatus::Pending, payment_method, payment_intent_id, payment_status,
            estimated_delivery_date: now + Duration::days(DELIVERY_ESTIMATE_DAYS),
            created_at: now, updated_at: now,
        }
    }

    pub fn compute_total(items: &[LineItem], delivery_charge: Money) -> Money {
        items.iter().fold(delivery_charge, |acc, i| acc.add(i.line_total()))
    }

    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items.iter().map(|i| StockLine { product_id: i.product_id, quantity: i.quantity }).collect()
    }

    pub fn apply_status(&mut self, target: OrderStatus) -> Result<(), OrderTransitionError> {
        if !self.status.can_become(target) {
            return Err(OrderTransitionError { from: self.status, to: target });
        }
        if self.status != target {
            self.status = target;
            self.touch();
        }
        Ok(())
    }

    pub fn record_payment(&mut self, outcome: PaymentOutcome) {
        if self.payment_status != Some(outcome) {
            self.payment_status = Some(outcome);
            self.touch();
        }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct OrderTransitionError { pub from: OrderStatus, pub to: OrderStatus }
impl std::error::Error for OrderTransitionError {}
impl fmt::Display for OrderTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "cannot move order from {} to {}", self.from, self.to) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: u32, price: i64, discount: i64) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(), name: "Widget".into(), image: None, description: None,
            price: Money::new(Decimal::new(price, 0)), discount: Decimal::new(discount, 0), quantity: qty,
            size: Some("M".into()), color: None, product_code: Some("W-1".into()),
        }
    }

    #[test]
    fn test_place_computes_total() {
        let items = vec![line(2, 10, 0), line(1, 50, 10)];
        let order = Order::place(ShippingDetails::default(), items, Money::new(Decimal::new(5, 0)), PaymentMethod::Cod, None);
        assert_eq!(order.total_amount.amount(), Decimal::new(70, 0));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.estimated_delivery_date - order.created_at, Duration::days(7));
        assert_eq!(order.stock_lines().iter().map(|l| l.quantity).sum::<u32>(), 3);
    }

    #[test]
    fn test_card_order_starts_paid() {
        let card = Order::place(ShippingDetails::default(), vec![line(1, 10, 0)], Money::ZERO, PaymentMethod::Stripe, Some("pi_1".into()));
        assert_eq!(card.payment_status, Some(PaymentOutcome::PaymentSucceeded));
        let cod = Order::place(ShippingDetails::default(), vec![line(1, 10, 0)], Money::ZERO, PaymentMethod::Cod, None);
        assert_eq!(cod.payment_status, None);
    }

    #[test]
    fn test_fulfilment_moves_freely() {
        let mut order = Order::place(ShippingDetails::default(), vec![line(1, 10, 0)], Money::ZERO, PaymentMethod::Cod, None);
        order.apply_status(OrderStatus::Shipped).unwrap();
        order.apply_status(OrderStatus::Confirm).unwrap();
        assert_eq!(order.status, OrderStatus::Confirm);
    }

    #[test]
    fn test_cancellation_guard() {
        let mut order = Order::place(ShippingDetails::default(), vec![line(1, 10, 0)], Money::ZERO, PaymentMethod::Cod, None);
        order.apply_status(OrderStatus::CancellationRequested).unwrap();
        order.apply_status(OrderStatus::CancellationRequested).unwrap();
        order.apply_status(OrderStatus::Pending).unwrap();
        order.apply_status(OrderStatus::Shipped).unwrap();
        let err = order.apply_status(OrderStatus::CancellationRequested).unwrap_err();
        assert_eq!(err.from, OrderStatus::Shipped);
    }

    #[test]
    fn test_parse_fulfilment() {
        assert_eq!(OrderStatus::parse_fulfilment("Shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse_fulfilment("CancellationRequested"), None);
        assert_eq!(OrderStatus::parse_fulfilment("Invalid"), None);
        assert_eq!("COD".parse::<PaymentMethod>(), Ok(PaymentMethod::Cod));
    }
}
