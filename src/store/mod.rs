//! Persistence seam.
//!
//! Every method that changes more than one record is a single atomic unit:
//! either all of its effects become visible or none do. Carts and orders are
//! written with an optimistic version check so that writers in other processes
//! cannot silently overwrite each other.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{Cart, Order, OrderStatus, ProductSnapshot};
use crate::domain::value_objects::{Money, OrderId, ProductId, Quantity, UserId};

mod memory;
mod postgres;
#[cfg(test)]
mod test_db;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A cart line whose quantity can no longer be covered by current stock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn for_user(user_id: UserId) -> Self { Self { user_id: Some(user_id), ..Self::default() } }

    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |u| order.user_id() == u) && self.status.map_or(true, |s| order.status() == s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub total_orders: u64,
    /// Sum over orders that were not cancelled.
    pub total_revenue: Money,
    pub pending_orders: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored version differs from the one read")]
    VersionConflict,

    #[error("insufficient stock for {} line(s)", .0.len())]
    Shortfall(Vec<StockShortfall>),

    #[error("stock for {product_id} is {current}, not the expected value")]
    StockMismatch { product_id: ProductId, current: u32 },

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("stored data is invalid: {0}")]
    Corrupt(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fresh product snapshot; never cached by callers across a transaction.
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, StoreError>;

    /// Fresh snapshots for every id that exists, in no particular order.
    async fn products(&self, ids: &[ProductId]) -> Result<Vec<ProductSnapshot>, StoreError>;

    /// Overwrites stock. With `expected` the write only happens if the stored
    /// stock still equals it. Returns the new snapshot and the previous stock.
    async fn set_stock(&self, id: ProductId, stock: u32, expected: Option<u32>) -> Result<(ProductSnapshot, u32), StoreError>;

    async fn count_low_stock(&self, threshold: u32) -> Result<u64, StoreError>;

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, StoreError>;

    /// Persists the cart if the stored version still equals `cart.version()`
    /// (zero meaning "never stored"). Returns the stored cart.
    async fn save_cart(&self, cart: Cart) -> Result<Cart, StoreError>;

    /// Atomically checks the cart version, decrements stock for every order
    /// line with a guard against going negative, inserts the order and empties
    /// the cart. On [`StoreError::Shortfall`] nothing has changed.
    async fn commit_checkout(&self, cart: &Cart, order: Order) -> Result<Order, StoreError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders matching the filter, newest first.
    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// Persists a lifecycle change under a version check and adds `restock`
    /// back to product stock in the same unit.
    async fn save_order(&self, order: Order, restock: &[(ProductId, Quantity)]) -> Result<Order, StoreError>;

    async fn order_totals(&self) -> Result<OrderTotals, StoreError>;
}
