use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Cancellation, OrderStore, ProductStore, ReserveOutcome, StoreError, TransitionOutcome};
use crate::domain::aggregates::{LineItem, Order, OrderStatus, PaymentOutcome, Product, ShippingDetails};
use crate::domain::value_objects::{Money, Quantity};
use crate::inventory::{merge_lines, StockLine};

const PRODUCT_COLUMNS: &str = "id, name, image, description, product_code, price, discount, stock";
const ORDER_COLUMNS: &str = "id, items, shipping, delivery_charge, total_amount, status, payment_method, \
    payment_intent_id, payment_status, estimated_delivery_date, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid, name: String, image: Option<String>, description: Option<String>, product_code: Option<String>,
    price: Decimal, discount: Decimal, stock: i32,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        let stock = u32::try_from(r.stock).map_err(|_| StoreError::Corrupt {
            id: r.id.to_string(),
            reason: format!("negative stock {}", r.stock),
        })?;
        Ok(Product {
            id: r.id, name: r.name, image: r.image, description: r.description, product_code: r.product_code,
            price: Money::new(r.price), discount: r.discount, stock: Quantity::new(stock),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    items: Json<Vec<LineItem>>,
    shipping: Json<ShippingDetails>,
    delivery_charge: Decimal,
    total_amount: Decimal,
    status: String,
    payment_method: String,
    payment_intent_id: Option<String>,
    payment_status: Option<String>,
    estimated_delivery_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt { id: r.id.to_string(), reason };
        let status = r.status.parse().map_err(|e| corrupt(format!("status: {e}")))?;
        let payment_method = r.payment_method.parse().map_err(|e| corrupt(format!("payment method: {e}")))?;
        let payment_status = r.payment_status.as_deref()
            .map(str::parse::<PaymentOutcome>)
            .transpose()
            .map_err(|e| corrupt(format!("payment status: {e}")))?;
        Ok(Order {
            id: r.id,
            items: r.items.0,
            shipping: r.shipping.0,
            delivery_charge: Money::new(r.delivery_charge),
            total_amount: Money::new(r.total_amount),
            status,
            payment_method,
            payment_intent_id: r.payment_intent_id,
            payment_status,
            estimated_delivery_date: r.estimated_delivery_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgProductStore { pool: PgPool }

impl PgProductStore {
    pub fn new(pool: &PgPool) -> Self { Self { pool: pool.clone() } }
}

/// Lines in product-id order so concurrent multi-item reservations lock rows in the same order.
fn ordered(lines: &[StockLine]) -> Vec<StockLine> {
    let mut sorted = lines.to_vec();
    sorted.sort_by_key(|l| l.product_id);
    sorted
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?
            .map(Product::try_from).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(ids.to_vec()).fetch_all(&self.pool).await?
            .into_iter().map(Product::try_from).collect()
    }

    async fn reserve(&self, lines: &[StockLine]) -> Result<ReserveOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        for line in ordered(lines) {
            let qty = i64::from(line.quantity);
            let updated = sqlx::query("UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND stock >= $1")
                .bind(qty).bind(line.product_id).execute(&mut *tx).await?;
            if updated.rows_affected() == 1 { continue; }

            let current: Option<(String, i32)> = sqlx::query_as("SELECT name, stock FROM products WHERE id = $1")
                .bind(line.product_id).fetch_optional(&mut *tx).await?;
            tx.rollback().await?;
            return Ok(match current {
                None => ReserveOutcome::Missing(line.product_id),
                Some((name, stock)) => ReserveOutcome::Insufficient {
                    product_id: line.product_id,
                    name,
                    available: u32::try_from(stock).unwrap_or(0),
                    requested: line.quantity,
                },
            });
        }
        tx.commit().await?;
        Ok(ReserveOutcome::Reserved)
    }

    async fn restore(&self, lines: &[StockLine]) -> Result<Vec<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut skipped = Vec::new();
        for line in ordered(lines) {
            let updated = sqlx::query("UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
                .bind(i64::from(line.quantity)).bind(line.product_id).execute(&mut *tx).await?;
            if updated.rows_affected() == 0 { skipped.push(line.product_id); }
        }
        tx.commit().await?;
        Ok(skipped)
    }
}

#[derive(Clone)]
pub struct PgOrderStore { pool: PgPool }

impl PgOrderStore {
    pub fn new(pool: &PgPool) -> Self { Self { pool: pool.clone() } }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, o: &Order) -> Result<(), StoreError> {
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"))
            .bind(o.id).bind(Json(&o.items)).bind(Json(&o.shipping))
            .bind(o.delivery_charge.amount()).bind(o.total_amount.amount())
            .bind(o.status.as_str()).bind(o.payment_method.as_str())
            .bind(&o.payment_intent_id).bind(o.payment_status.map(|s| s.as_str()))
            .bind(o.estimated_delivery_date).bind(o.created_at).bind(o.updated_at)
            .execute(&self.pool).await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Conflict(format!("payment intent {} already used", o.payment_intent_id.as_deref().unwrap_or("-")))
                }
                _ => StoreError::Database(e),
            })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool).await?
            .into_iter().map(Order::try_from).collect()
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_id = $1"))
            .bind(intent_id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn transition(&self, id: Uuid, target: OrderStatus) -> Result<TransitionOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?;
        let Some((current,)) = current else { return Ok(TransitionOutcome::NotFound) };
        let previous: OrderStatus = current.parse().map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("status: {e}"),
        })?;
        if !previous.can_become(target) {
            return Ok(TransitionOutcome::Rejected(previous));
        }
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, \
             updated_at = CASE WHEN status = $2 THEN updated_at ELSE NOW() END \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
            .bind(id).bind(target.as_str()).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(TransitionOutcome::Applied { order: Order::try_from(row)?, previous })
    }

    async fn set_payment_status(&self, intent_id: &str, outcome: PaymentOutcome) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET payment_status = $2, \
             updated_at = CASE WHEN payment_status IS DISTINCT FROM $2 THEN NOW() ELSE updated_at END \
             WHERE payment_intent_id = $1 RETURNING {ORDER_COLUMNS}"
        ))
            .bind(intent_id).bind(outcome.as_str()).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn cancel(&self, id: Uuid) -> Result<Option<Cancellation>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id).fetch_optional(&mut *tx).await?;
        let Some(row) = row else { return Ok(None) };
        let order = Order::try_from(row)?;

        let mut skipped = Vec::new();
        for line in ordered(&merge_lines(&order.stock_lines())) {
            let updated = sqlx::query("UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
                .bind(i64::from(line.quantity)).bind(line.product_id).execute(&mut *tx).await?;
            if updated.rows_affected() == 0 { skipped.push(line.product_id); }
        }
        sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(Cancellation { order, skipped }))
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO processed_webhook_events (event_id, event_type, processed_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT DO NOTHING",
        )
            .bind(event_id).bind(event_type).execute(&self.pool).await?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn release_webhook_event(&self, event_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id).execute(&self.pool).await?;
        Ok(())
    }
}
