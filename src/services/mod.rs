//! Storefront services.
//!
//! [`Storefront`] is the single entry point the transport layer talks to. It
//! owns no state besides per-key locks; carts, orders and stock live in the
//! [`Store`]. Identity is always passed in by the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::aggregates::{Cart, Order, ProductSnapshot};
use crate::domain::events::StorefrontEvent;
use crate::domain::value_objects::{Money, OrderId, ProductId, UserId};
use crate::publisher::{EventPublisher, NullPublisher};
use crate::store::Store;
use crate::{Result, StorefrontError};

mod admin;
mod cart;
mod checkout;
mod lifecycle;
mod locks;

pub use crate::store::OrderFilter;
pub use locks::KeyedLocks;

/// The identity and capability of whoever issued a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Caller {
    pub fn shopper(user_id: UserId) -> Self { Self { user_id, is_admin: false } }
    pub fn admin(user_id: UserId) -> Self { Self { user_id, is_admin: true } }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin { Ok(()) } else { Err(StorefrontError::Forbidden) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorefrontSettings {
    /// Products with stock strictly below this count as low stock.
    pub low_stock_threshold: u32,
    pub recent_orders_limit: usize,
}

impl Default for StorefrontSettings {
    fn default() -> Self { Self { low_stock_threshold: 10, recent_orders_limit: 5 } }
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardStats {
    pub total_orders: u64,
    pub total_revenue: Money,
    pub pending_orders: u64,
    pub low_stock_products: u64,
    pub recent_orders: Vec<Order>,
}

pub struct Storefront {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    settings: StorefrontSettings,
    cart_locks: KeyedLocks<UserId>,
    order_locks: KeyedLocks<OrderId>,
}

impl Storefront {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            publisher: Arc::new(NullPublisher),
            settings: StorefrontSettings::default(),
            cart_locks: KeyedLocks::new(),
            order_locks: KeyedLocks::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_settings(mut self, settings: StorefrontSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> StorefrontSettings { self.settings }

    pub(crate) async fn snapshot(&self, product_id: ProductId) -> Result<ProductSnapshot> {
        self.store.product(product_id).await?.ok_or(StorefrontError::ProductNotFound { product_id })
    }

    async fn load_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.store.cart(user_id).await?.unwrap_or_else(|| Cart::empty(user_id)))
    }

    async fn publish(&self, event: StorefrontEvent) {
        if let Err(error) = self.publisher.publish(&event).await {
            warn!(%error, event = event.name(), "failed to publish event");
        }
    }
}
