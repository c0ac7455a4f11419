//! Storefront Core
//!
//! The cart/order consistency core of a retail storefront.
//!
//! ## Features
//! - Per-user authoritative cart with stock-bounded quantities
//! - All-or-nothing checkout with guarded inventory decrements
//! - Administrator-driven order fulfilment and payment state machines
//! - Request/response reconciliation contract for optimistic clients
//! - In-memory and Postgres persistence, NATS event publishing, axum HTTP surface

use serde::Serialize;
use thiserror::Error;

pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod reconcile;
pub mod services;
pub mod store;

pub use domain::aggregates::{
    Cart, CartItem, Order, OrderItem, OrderStatus, PaymentStatus, PaymentUpdate, ProductSnapshot,
    ShipmentDetails, ShippingInfo,
};
pub use domain::events::StorefrontEvent;
pub use domain::value_objects::{DiscountPercent, Money, OrderId, ProductId, Quantity, UserId};
pub use reconcile::{OptimisticView, Reconciled, Rejection};
pub use services::{Caller, DashboardStats, OrderFilter, Storefront, StorefrontSettings};
pub use store::{MemoryStore, PgStore, StockShortfall, Store, StoreError};

use domain::aggregates::{CartError, OrderError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("product {product_id} is out of stock")]
    OutOfStock { product_id: ProductId },

    #[error("insufficient stock for product {product_id}: requested {requested}, at most {max_available} available")]
    InsufficientStock { product_id: ProductId, requested: u32, max_available: u32 },

    #[error("quantity must be a positive integer")]
    InvalidQuantity,

    #[error("product {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    #[error("product {product_id} is not in the cart")]
    ItemNotFound { product_id: ProductId },

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: OrderId },

    #[error("cart is empty")]
    EmptyCart,

    #[error("stock changed for {} cart line(s)", .lines.len())]
    StockChanged { lines: Vec<StockShortfall> },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("administrator capability required")]
    Forbidden,

    #[error("stock for product {product_id} changed concurrently (now {current})")]
    StockConflict { product_id: ProductId, current: u32 },

    #[error("record was modified concurrently, refetch and retry")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl StorefrontError {
    /// Stable wire identifier for the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfStock { .. } => ErrorKind::OutOfStock,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::InvalidQuantity => ErrorKind::InvalidQuantity,
            Self::ProductNotFound { .. } => ErrorKind::ProductNotFound,
            Self::ItemNotFound { .. } => ErrorKind::ItemNotFound,
            Self::OrderNotFound { .. } => ErrorKind::OrderNotFound,
            Self::EmptyCart => ErrorKind::EmptyCart,
            Self::StockChanged { .. } => ErrorKind::StockChanged,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::StockConflict { .. } => ErrorKind::StockConflict,
            Self::Conflict => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OutOfStock,
    InsufficientStock,
    InvalidQuantity,
    ProductNotFound,
    ItemNotFound,
    OrderNotFound,
    EmptyCart,
    StockChanged,
    InvalidTransition,
    Forbidden,
    StockConflict,
    Conflict,
    Storage,
}

impl From<CartError> for StorefrontError {
    fn from(error: CartError) -> Self {
        match error {
            CartError::OutOfStock { product_id } => Self::OutOfStock { product_id },
            CartError::InsufficientStock { product_id, requested, max_available } => {
                Self::InsufficientStock { product_id, requested, max_available }
            }
            CartError::ItemNotFound { product_id } => Self::ItemNotFound { product_id },
        }
    }
}

impl From<OrderError> for StorefrontError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::NoItems => Self::EmptyCart,
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
        }
    }
}

impl From<StoreError> for StorefrontError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict => Self::Conflict,
            StoreError::Shortfall(lines) => Self::StockChanged { lines },
            StoreError::StockMismatch { product_id, current } => Self::StockConflict { product_id, current },
            StoreError::ProductNotFound(product_id) => Self::ProductNotFound { product_id },
            StoreError::OrderNotFound(order_id) => Self::OrderNotFound { order_id },
            other => Self::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
