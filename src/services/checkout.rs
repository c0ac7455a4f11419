//! Checkout Transaction: cart to order, exactly once, with inventory committed
//! in the same atomic unit.

use std::collections::HashMap;

use tracing::{info, instrument, warn};

use super::Storefront;
use crate::domain::aggregates::{CartItem, Order, ShippingInfo};
use crate::domain::events::StorefrontEvent;
use crate::domain::value_objects::{ProductId, UserId};
use crate::store::{StockShortfall, StoreError};
use crate::{Result, StorefrontError};

impl Storefront {
    /// Converts the user's cart into a pending order.
    ///
    /// Every line is checked against a fresh product snapshot first and the
    /// whole call fails with [`StorefrontError::StockChanged`] naming every
    /// short line. The store then repeats the check under its own lock while
    /// decrementing, which catches checkouts racing for the same units. On any
    /// error the cart and all stock are exactly as before.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn checkout(&self, user_id: UserId, shipping: ShippingInfo) -> Result<Order> {
        let guard = self.cart_locks.acquire(&user_id).await;
        let cart = self.load_cart(user_id).await?;
        if cart.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }

        let ids: Vec<ProductId> = cart.items().iter().map(CartItem::product_id).collect();
        let fresh: HashMap<ProductId, u32> = self.store.products(&ids).await?
            .into_iter()
            .map(|p| (p.id, p.stock))
            .collect();
        let lines: Vec<StockShortfall> = cart.items().iter().filter_map(|item| {
            let available = fresh.get(&item.product_id()).copied().unwrap_or(0);
            let requested = item.quantity().get();
            (requested > available).then_some(StockShortfall { product_id: item.product_id(), requested, available })
        }).collect();
        if !lines.is_empty() {
            warn!(short_lines = lines.len(), "checkout rejected, stock changed since add");
            return Err(StorefrontError::StockChanged { lines });
        }

        let order = Order::place(&cart, shipping)?;
        let order = match self.store.commit_checkout(&cart, order).await {
            Ok(order) => order,
            Err(StoreError::Shortfall(lines)) => {
                warn!(short_lines = lines.len(), "checkout lost a race for stock");
                return Err(StorefrontError::StockChanged { lines });
            }
            Err(error) => return Err(error.into()),
        };

        drop(guard);

        info!(order_id = %order.id(), total = %order.total_amount(), lines = order.items().len(), "order placed");
        self.publish(StorefrontEvent::OrderPlaced {
            order_id: order.id(),
            user_id,
            total_amount: order.total_amount(),
            lines: order.items().len(),
        }).await;
        Ok(order)
    }
}
