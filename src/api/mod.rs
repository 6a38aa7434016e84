//! HTTP surface.

mod orders;

use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::orders::OrderService;
use crate::payment::PaymentService;

#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub payments: Arc<PaymentService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-orders"})) }))
        .nest("/orders", orders::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
