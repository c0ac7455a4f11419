//! Order Aggregate
//!
//! Orders are created once per successful checkout. After that only the
//! lifecycle methods below may change them: `status`, the payment fields and
//! the shipment fields. Items are a frozen copy of cart pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use crate::domain::aggregates::cart::Cart;
use crate::domain::value_objects::{Money, OrderId, ProductId, Quantity, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Order {
    pub(crate) id: OrderId,
    pub(crate) user_id: UserId,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) shipping_address: String,
    pub(crate) city: String,
    pub(crate) postal_code: String,
    pub(crate) country: String,
    pub(crate) status: OrderStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) payment_method: Option<String>,
    pub(crate) total_amount: Money,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) shipped_date: Option<DateTime<Utc>>,
    pub(crate) estimated_delivery_date: Option<DateTime<Utc>>,
    pub(crate) delivered_date: Option<DateTime<Utc>>,
    pub(crate) tracking_number: Option<String>,
    pub(crate) payment_transaction_id: Option<String>,
    pub(crate) payment_date: Option<DateTime<Utc>>,
    pub(crate) version: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name_snapshot: String,
    pub unit_price: Money,
    pub quantity: Quantity,
    pub subtotal: Money,
}

/// Shipping fields captured at checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub shipping_address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub payment_method: Option<String>,
}

/// Optional data accepted when an order enters `shipped`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Completed, Failed, Refunded }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    /// The complete fulfilment graph.
    pub fn next_states(self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Shipped, Self::Cancelled],
            Self::Shipped => &[Self::Delivered],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool { self.next_states().contains(&next) }
    pub fn is_terminal(self) -> bool { self.next_states().is_empty() }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [Self::Pending, Self::Completed, Self::Failed, Self::Refunded];

    pub fn next_states(self) -> &'static [PaymentStatus] {
        match self {
            Self::Pending => &[Self::Completed, Self::Failed],
            Self::Failed => &[Self::Pending, Self::Completed],
            Self::Completed => &[Self::Refunded],
            Self::Refunded => &[],
        }
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool { self.next_states().contains(&next) }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);

/// Result of a successful status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Stock to hand back to the catalog; only non-empty when cancelling.
    pub restock: Vec<(ProductId, Quantity)>,
}

impl Order {
    /// Freezes the cart lines into a new pending order.
    pub fn place(cart: &Cart, shipping: ShippingInfo) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::NoItems); }
        let items = cart.items().iter().map(|line| OrderItem {
            product_id: line.product_id(),
            product_name_snapshot: line.product_name().to_string(),
            unit_price: line.unit_price(),
            quantity: line.quantity(),
            subtotal: line.subtotal(),
        }).collect();
        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(), user_id: cart.user_id(), items,
            shipping_address: shipping.shipping_address, city: shipping.city,
            postal_code: shipping.postal_code, country: shipping.country,
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            payment_method: shipping.payment_method, total_amount: cart.total_price(),
            created_at: now, updated_at: now, shipped_date: None, estimated_delivery_date: None,
            delivered_date: None, tracking_number: None, payment_transaction_id: None,
            payment_date: None, version: 0,
        })
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn payment_method(&self) -> Option<&str> { self.payment_method.as_deref() }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn shipping_address(&self) -> &str { &self.shipping_address }
    pub fn city(&self) -> &str { &self.city }
    pub fn postal_code(&self) -> &str { &self.postal_code }
    pub fn country(&self) -> &str { &self.country }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn shipped_date(&self) -> Option<DateTime<Utc>> { self.shipped_date }
    pub fn estimated_delivery_date(&self) -> Option<DateTime<Utc>> { self.estimated_delivery_date }
    pub fn delivered_date(&self) -> Option<DateTime<Utc>> { self.delivered_date }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn payment_transaction_id(&self) -> Option<&str> { self.payment_transaction_id.as_deref() }
    pub fn payment_date(&self) -> Option<DateTime<Utc>> { self.payment_date }
    pub fn version(&self) -> u64 { self.version }

    pub fn transition(&mut self, to: OrderStatus, shipment: ShipmentDetails) -> Result<Transition, OrderError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from: from.to_string(), to: to.to_string() });
        }
        let now = Utc::now();
        match to {
            OrderStatus::Shipped => {
                self.shipped_date.get_or_insert(now);
                if shipment.tracking_number.is_some() { self.tracking_number = shipment.tracking_number; }
                if shipment.estimated_delivery_date.is_some() { self.estimated_delivery_date = shipment.estimated_delivery_date; }
            }
            OrderStatus::Delivered => { self.delivered_date.get_or_insert(now); }
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Cancelled => {}
        }
        let restock = if to == OrderStatus::Cancelled {
            self.items.iter().map(|i| (i.product_id, i.quantity)).collect()
        } else {
            vec![]
        };
        self.status = to;
        self.updated_at = now;
        Ok(Transition { from, to, restock })
    }

    pub fn update_payment(&mut self, update: PaymentUpdate) -> Result<PaymentStatus, OrderError> {
        let from = self.payment_status;
        if !from.can_transition_to(update.status) {
            return Err(OrderError::InvalidTransition { from: from.to_string(), to: update.status.to_string() });
        }
        let now = Utc::now();
        if update.payment_method.is_some() { self.payment_method = update.payment_method; }
        if update.transaction_id.is_some() { self.payment_transaction_id = update.transaction_id; }
        if update.status == PaymentStatus::Completed { self.payment_date = Some(now); }
        self.payment_status = update.status;
        self.updated_at = now;
        Ok(from)
    }

    pub fn mark_saved(&mut self, version: u64) { self.version = version; }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::ProductSnapshot;
    use crate::domain::value_objects::DiscountPercent;

    fn placed() -> Order {
        let p = ProductSnapshot::new(ProductId::new(), "Widget", Money::from_cents(1000), DiscountPercent::default(), 10);
        let mut cart = Cart::empty(UserId::new());
        cart.add_item(&p, Quantity::new(2).unwrap()).unwrap();
        Order::place(&cart, ShippingInfo { shipping_address: "1 Main St".into(), city: "Springfield".into(), postal_code: "12345".into(), country: "US".into(), payment_method: None }).unwrap()
    }

    #[test]
    fn test_order_workflow() {
        let mut order = placed();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_cents(2000));
        order.transition(OrderStatus::Processing, ShipmentDetails::default()).unwrap();
        let shipment = ShipmentDetails { tracking_number: Some("1Z999".into()), estimated_delivery_date: None };
        order.transition(OrderStatus::Shipped, shipment).unwrap();
        assert!(order.shipped_date().is_some());
        assert_eq!(order.tracking_number(), Some("1Z999"));
        order.transition(OrderStatus::Delivered, ShipmentDetails::default()).unwrap();
        assert!(order.status().is_terminal());
    }

    #[test]
    fn test_cannot_skip_processing() {
        let mut order = placed();
        let err = order.transition(OrderStatus::Shipped, ShipmentDetails::default()).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: "pending".into(), to: "shipped".into() });
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_cancel_yields_restock() {
        let mut order = placed();
        let t = order.transition(OrderStatus::Cancelled, ShipmentDetails::default()).unwrap();
        assert_eq!(t.restock.len(), 1);
        assert_eq!(t.restock[0].1, Quantity::new(2).unwrap());
        assert!(order.transition(OrderStatus::Processing, ShipmentDetails::default()).is_err());
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let listed = matches!(
                    (from, to),
                    (OrderStatus::Pending, OrderStatus::Processing | OrderStatus::Cancelled)
                        | (OrderStatus::Processing, OrderStatus::Shipped | OrderStatus::Cancelled)
                        | (OrderStatus::Shipped, OrderStatus::Delivered)
                );
                assert_eq!(from.can_transition_to(to), listed, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_refund_requires_completed_payment() {
        let mut order = placed();
        let refund = PaymentUpdate { status: PaymentStatus::Refunded, ..Default::default() };
        assert!(order.update_payment(refund.clone()).is_err());
        order.update_payment(PaymentUpdate { status: PaymentStatus::Completed, payment_method: Some("card".into()), transaction_id: Some("tx_1".into()) }).unwrap();
        assert!(order.payment_date().is_some());
        assert_eq!(order.update_payment(refund).unwrap(), PaymentStatus::Completed);
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        // Payment is independent of fulfilment.
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("lost".parse::<PaymentStatus>().is_err());
    }
}
