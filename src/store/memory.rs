//! In-memory store. A single async mutex guards all records, so each trait
//! method is trivially atomic with respect to every other.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{OrderFilter, OrderTotals, StockShortfall, Store, StoreError};
use crate::domain::aggregates::{Cart, Order, OrderStatus, ProductSnapshot};
use crate::domain::value_objects::{Money, OrderId, ProductId, Quantity, UserId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, ProductSnapshot>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_products(products: impl IntoIterator<Item = ProductSnapshot>) -> Self {
        let products = products.into_iter().map(|p| (p.id, p)).collect();
        Self { state: Mutex::new(State { products, ..State::default() }) }
    }

    /// Inserts or replaces a catalog product.
    pub async fn upsert_product(&self, product: ProductSnapshot) {
        self.state.lock().await.products.insert(product.id, product);
    }
}

impl State {
    fn check_cart_version(&self, cart: &Cart) -> Result<(), StoreError> {
        let stored = self.carts.get(&cart.user_id()).map_or(0, Cart::version);
        if stored == cart.version() { Ok(()) } else { Err(StoreError::VersionConflict) }
    }

    fn shortfalls(&self, lines: &[(ProductId, Quantity)]) -> Vec<StockShortfall> {
        lines.iter().filter_map(|(id, qty)| {
            let available = self.products.get(id).map_or(0, |p| p.stock);
            (qty.get() > available).then_some(StockShortfall { product_id: *id, requested: qty.get(), available })
        }).collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<ProductSnapshot>, StoreError> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn set_stock(&self, id: ProductId, stock: u32, expected: Option<u32>) -> Result<(ProductSnapshot, u32), StoreError> {
        let mut state = self.state.lock().await;
        let product = state.products.get_mut(&id).ok_or(StoreError::ProductNotFound(id))?;
        let previous = product.stock;
        if expected.is_some_and(|e| e != previous) {
            return Err(StoreError::StockMismatch { product_id: id, current: previous });
        }
        product.stock = stock;
        Ok((product.clone(), previous))
    }

    async fn count_low_stock(&self, threshold: u32) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.products.values().filter(|p| p.is_low_stock(threshold)).count() as u64)
    }

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        Ok(self.state.lock().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, mut cart: Cart) -> Result<Cart, StoreError> {
        let mut state = self.state.lock().await;
        state.check_cart_version(&cart)?;
        cart.mark_saved(cart.version() + 1);
        state.carts.insert(cart.user_id(), cart.clone());
        Ok(cart)
    }

    async fn commit_checkout(&self, cart: &Cart, mut order: Order) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        state.check_cart_version(cart)?;
        let lines: Vec<_> = order.items().iter().map(|i| (i.product_id, i.quantity)).collect();
        let shortfalls = state.shortfalls(&lines);
        if !shortfalls.is_empty() {
            return Err(StoreError::Shortfall(shortfalls));
        }
        for (id, qty) in &lines {
            let product = state.products.get_mut(id).ok_or(StoreError::ProductNotFound(*id))?;
            product.take_stock(*qty).map_err(|available| {
                StoreError::Shortfall(vec![StockShortfall { product_id: *id, requested: qty.get(), available }])
            })?;
        }
        order.mark_saved(1);
        state.orders.insert(order.id(), order.clone());
        let mut emptied = cart.clone();
        emptied.clear();
        emptied.mark_saved(cart.version() + 1);
        state.carts.insert(emptied.user_id(), emptied);
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        if let Some(limit) = filter.limit { orders.truncate(limit); }
        Ok(orders)
    }

    async fn save_order(&self, mut order: Order, restock: &[(ProductId, Quantity)]) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        let stored = state.orders.get(&order.id()).ok_or(StoreError::OrderNotFound(order.id()))?;
        if stored.version() != order.version() {
            return Err(StoreError::VersionConflict);
        }
        if let Some((missing, _)) = restock.iter().find(|(id, _)| !state.products.contains_key(id)) {
            return Err(StoreError::ProductNotFound(*missing));
        }
        for (id, qty) in restock {
            if let Some(product) = state.products.get_mut(id) { product.restock(*qty); }
        }
        order.mark_saved(order.version() + 1);
        state.orders.insert(order.id(), order.clone());
        Ok(order)
    }

    async fn order_totals(&self) -> Result<OrderTotals, StoreError> {
        let state = self.state.lock().await;
        let orders = state.orders.values();
        Ok(OrderTotals {
            total_orders: orders.len() as u64,
            total_revenue: orders.clone().filter(|o| o.status() != OrderStatus::Cancelled).map(Order::total_amount).sum::<Money>(),
            pending_orders: orders.filter(|o| o.status() == OrderStatus::Pending).count() as u64,
        })
    }
}
