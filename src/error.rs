//! HTTP mapping for service errors.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::{json, Value};
use tracing::error;

use crate::inventory::InventoryError;
use crate::orders::OrderError;
use crate::payment::PaymentError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, body: json!({ "error": message.into() }) }
    }

    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, message) }

    pub fn status(&self) -> StatusCode { self.status }

    fn with(mut self, key: &str, value: Value) -> Self {
        if let Some(obj) = self.body.as_object_mut() { obj.insert(key.to_string(), value); }
        self
    }

    fn internal(source: &dyn std::fmt::Display) -> Self {
        error!(error = %source, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, Json(self.body)).into_response() }
}

impl From<InventoryError> for ApiError {
    fn from(e: InventoryError) -> Self {
        match &e {
            InventoryError::ProductNotFound(id) => {
                Self::new(StatusCode::NOT_FOUND, e.to_string()).with("productId", json!(id))
            }
            InventoryError::InsufficientStock { product_id, available, .. } => Self::bad_request(e.to_string())
                .with("productId", json!(product_id))
                .with("available", json!(available)),
            InventoryError::InvalidQuantity(id) => Self::bad_request(e.to_string()).with("productId", json!(id)),
            InventoryError::Storage(inner) => Self::internal(inner),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match &e {
            PaymentError::Validation(_) | PaymentError::InvalidSignature(_) | PaymentError::MalformedEvent(_) => {
                Self::bad_request(e.to_string())
            }
            PaymentError::Gateway(inner) => {
                error!(error = %inner, "Payment gateway error");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, inner.to_string())
            }
            PaymentError::Storage(inner) => Self::internal(inner),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Validation { field, message } => Self::bad_request(message).with("field", json!(field)),
            OrderError::Inventory(inner) => inner.into(),
            OrderError::Payment(inner) => inner.into(),
            e @ (OrderError::PaymentNotCompleted(_) | OrderError::IllegalTransition(_)) => Self::bad_request(e.to_string()),
            e @ OrderError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            OrderError::Storage(inner) => Self::internal(&inner),
        }
    }
}
