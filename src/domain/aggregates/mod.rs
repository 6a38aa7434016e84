//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError};
pub use order::{
    LineItem, Order, OrderStatus, OrderTransitionError, PaymentMethod, PaymentOutcome, ShippingDetails,
    DELIVERY_ESTIMATE_DAYS,
};
pub use cart::{Cart, CartError, CartItem};
