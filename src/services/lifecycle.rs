//! Order Lifecycle: order queries, fulfilment status and payment status.

use tracing::{info, instrument};

use super::{Caller, Storefront};
use crate::domain::aggregates::{Order, OrderStatus, PaymentUpdate, ShipmentDetails};
use crate::domain::events::StorefrontEvent;
use crate::domain::value_objects::{OrderId, UserId};
use crate::store::OrderFilter;
use crate::{Result, StorefrontError};

impl Storefront {
    /// The user's own orders, newest first.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.orders(&OrderFilter::for_user(user_id)).await?)
    }

    #[instrument(skip_all, fields(caller = %caller.user_id))]
    pub async fn list_all_orders(&self, caller: &Caller, filter: OrderFilter) -> Result<Vec<Order>> {
        caller.require_admin()?;
        Ok(self.store.orders(&filter).await?)
    }

    /// Orders owned by someone else look exactly like missing ones to a
    /// non-admin caller.
    #[instrument(skip_all, fields(caller = %caller.user_id, %order_id))]
    pub async fn get_order(&self, caller: &Caller, order_id: OrderId) -> Result<Order> {
        match self.store.order(order_id).await? {
            Some(order) if caller.is_admin || order.user_id() == caller.user_id => Ok(order),
            _ => Err(StorefrontError::OrderNotFound { order_id }),
        }
    }

    /// Moves an order along the fulfilment graph. Cancelling returns every
    /// line's quantity to stock in the same atomic unit as the status write.
    #[instrument(skip_all, fields(caller = %caller.user_id, %order_id, to = %to))]
    pub async fn update_status(
        &self,
        caller: &Caller,
        order_id: OrderId,
        to: OrderStatus,
        shipment: ShipmentDetails,
    ) -> Result<Order> {
        caller.require_admin()?;
        let guard = self.order_locks.acquire(&order_id).await;
        let mut order = self.load_order(order_id).await?;
        let transition = order.transition(to, shipment)?;
        let order = self.store.save_order(order, &transition.restock).await?;
        drop(guard);
        info!(from = %transition.from, restocked_lines = transition.restock.len(), "order status changed");

        self.publish(StorefrontEvent::OrderStatusChanged { order_id, from: transition.from, to: transition.to }).await;
        for (product_id, quantity) in transition.restock {
            self.publish(StorefrontEvent::StockRestored { order_id, product_id, quantity: quantity.get() }).await;
        }
        Ok(order)
    }

    /// Payment status moves on its own graph and never touches fulfilment
    /// status or stock.
    #[instrument(skip_all, fields(caller = %caller.user_id, %order_id, to = %update.status))]
    pub async fn update_payment(&self, caller: &Caller, order_id: OrderId, update: PaymentUpdate) -> Result<Order> {
        caller.require_admin()?;
        let guard = self.order_locks.acquire(&order_id).await;
        let mut order = self.load_order(order_id).await?;
        let from = order.update_payment(update)?;
        let order = self.store.save_order(order, &[]).await?;
        drop(guard);
        info!(%from, "payment status changed");

        self.publish(StorefrontEvent::PaymentStatusChanged { order_id, from, to: order.payment_status() }).await;
        Ok(order)
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.store.order(order_id).await?.ok_or(StorefrontError::OrderNotFound { order_id })
    }
}
