//! Storefront Orders
//!
//! Checkout, payment and fulfilment back end for a storefront.
//!
//! ## Features
//! - Stock reservation that never oversells
//! - Card payments through Stripe PaymentIntents with signed webhooks
//! - Cash-on-delivery orders
//! - Order status tracking and two-step cancellation
//! - Order events over NATS

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod orders;
pub mod payment;
pub mod publisher;
pub mod store;

pub use api::{router, AppState};
pub use config::{Config, ConfigError};
pub use domain::aggregates::{Order, OrderStatus, PaymentMethod, PaymentOutcome, Product};
pub use domain::events::OrderEvent;
pub use error::ApiError;
pub use inventory::{InventoryError, InventoryService, StockLine};
pub use orders::{CheckoutRequest, OrderError, OrderService};
pub use payment::{PaymentError, PaymentGateway, PaymentService, PaymentSettings, StripeGateway};
pub use publisher::EventPublisher;
