//! Domain events, raised after a mutation has been committed.
use serde::Serialize;
use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use crate::domain::value_objects::{Money, OrderId, ProductId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorefrontEvent {
    OrderPlaced { order_id: OrderId, user_id: UserId, total_amount: Money, lines: usize },
    OrderStatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    PaymentStatusChanged { order_id: OrderId, from: PaymentStatus, to: PaymentStatus },
    StockRestored { order_id: OrderId, product_id: ProductId, quantity: u32 },
    StockAdjusted { product_id: ProductId, previous: u32, stock: u32 },
}

impl StorefrontEvent {
    /// NATS subject suffix for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "order_placed",
            Self::OrderStatusChanged { .. } => "order_status_changed",
            Self::PaymentStatusChanged { .. } => "payment_status_changed",
            Self::StockRestored { .. } => "stock_restored",
            Self::StockAdjusted { .. } => "stock_adjusted",
        }
    }
}
