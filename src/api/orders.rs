use axum::{
    body::Bytes,
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;
use crate::orders::CheckoutRequest;
use crate::payment::CreatedIntent;

type ApiResult<T> = Result<T, ApiError>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/stripe-webhook", post(stripe_webhook))
        .route("/checkout", post(checkout))
        .route("/all-orders", get(list_orders))
        .route("/:id", get(get_order))
        .route("/update-status/:id", put(update_status))
        .route("/request-cancel/:id", put(request_cancel))
        .route("/cancel/:id", delete(approve_cancel))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(v)| v).map_err(|e| ApiError::bad_request(e.body_text()))
}

fn order_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id).map_err(|_| ApiError::bad_request("Invalid order id"))
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest { pub amount: Decimal, pub currency: Option<String> }

#[derive(Debug, Deserialize)]
pub struct StatusUpdate { pub status: String }

async fn create_payment_intent(State(s): State<AppState>, payload: Result<Json<CreateIntentRequest>, JsonRejection>) -> ApiResult<Json<CreatedIntent>> {
    let r = body(payload)?;
    Ok(Json(s.payments.create_intent(r.amount, r.currency.as_deref()).await?))
}

async fn stripe_webhook(State(s): State<AppState>, headers: HeaderMap, raw: Bytes) -> ApiResult<Json<Value>> {
    let signature = headers.get("stripe-signature").and_then(|v| v.to_str().ok());
    s.payments.reconcile_webhook(&raw, signature).await?;
    Ok(Json(json!({"received": true})))
}

async fn checkout(State(s): State<AppState>, payload: Result<Json<CheckoutRequest>, JsonRejection>) -> ApiResult<(StatusCode, Json<Value>)> {
    let order = s.orders.place_order(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(json!({"order": order}))))
}

async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(s.orders.list_orders().await?)))
}

async fn get_order(State(s): State<AppState>, path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Json<Value>> {
    let order = s.orders.get_order(order_id(path)?).await?;
    Ok(Json(json!({"order": order})))
}

async fn update_status(State(s): State<AppState>, path: Result<Path<Uuid>, PathRejection>, payload: Result<Json<StatusUpdate>, JsonRejection>) -> ApiResult<Json<Value>> {
    let id = order_id(path)?;
    let order = s.orders.advance_status(id, &body(payload)?.status).await?;
    Ok(Json(json!({"order": order})))
}

async fn request_cancel(State(s): State<AppState>, path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Json<Value>> {
    let order = s.orders.request_cancellation(order_id(path)?).await?;
    Ok(Json(json!({"order": order})))
}

async fn approve_cancel(State(s): State<AppState>, path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Json<Value>> {
    s.orders.approve_cancellation(order_id(path)?).await?;
    Ok(Json(json!({"message": "Order cancelled and stock restored"})))
}
