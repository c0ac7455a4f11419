//! Cart Aggregate
//!
//! One cart per shopper, created lazily and never deleted. Totals are derived
//! from the lines after every mutation and are never accepted from outside.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use crate::domain::aggregates::product::ProductSnapshot;
use crate::domain::value_objects::{Money, ProductId, Quantity, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cart {
    user_id: UserId,
    items: Vec<CartItem>,
    total_items: u64,
    total_price: Money,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartItem {
    product_id: ProductId,
    product_name: String,
    quantity: Quantity,
    unit_price: Money,
    subtotal: Money,
}

impl CartItem {
    pub fn new(product_id: ProductId, product_name: impl Into<String>, quantity: Quantity, unit_price: Money) -> Self {
        Self { product_id, product_name: product_name.into(), quantity, unit_price, subtotal: unit_price.multiply(quantity) }
    }

    pub fn product_id(&self) -> ProductId { self.product_id }
    pub fn product_name(&self) -> &str { &self.product_name }
    pub fn quantity(&self) -> Quantity { self.quantity }
    pub fn unit_price(&self) -> Money { self.unit_price }
    pub fn subtotal(&self) -> Money { self.subtotal }

    fn reprice(&mut self, snapshot: &ProductSnapshot, quantity: Quantity) {
        *self = CartItem::new(snapshot.id, snapshot.name.clone(), quantity, snapshot.discounted_price());
    }
}

impl Cart {
    pub fn empty(user_id: UserId) -> Self {
        let now = Utc::now();
        Self { user_id, items: vec![], total_items: 0, total_price: Money::ZERO, version: 0, created_at: now, updated_at: now }
    }

    /// Rebuilds a persisted cart; totals are recomputed from the lines.
    pub fn restore(user_id: UserId, items: Vec<CartItem>, version: u64, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        let mut cart = Self { user_id, items, total_items: 0, total_price: Money::ZERO, version, created_at, updated_at };
        cart.recalculate();
        cart
    }

    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn total_items(&self) -> u64 { self.total_items }
    pub fn total_price(&self) -> Money { self.total_price }
    pub fn version(&self) -> u64 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> { self.items.iter().find(|i| i.product_id == product_id) }

    /// Adds `quantity` of the product, merging into an existing line. The line
    /// is repriced at the snapshot's discounted price.
    pub fn add_item(&mut self, snapshot: &ProductSnapshot, quantity: Quantity) -> Result<(), CartError> {
        if !snapshot.is_in_stock() {
            return Err(CartError::OutOfStock { product_id: snapshot.id });
        }
        let existing = self.item(snapshot.id).map(|i| i.quantity.get()).unwrap_or(0);
        let max_addable = snapshot.stock.saturating_sub(existing);
        let insufficient = CartError::InsufficientStock { product_id: snapshot.id, requested: quantity.get(), max_available: max_addable };
        let wanted = match self.item(snapshot.id) {
            Some(line) => line.quantity.checked_add(quantity).ok_or_else(|| insufficient.clone())?,
            None => quantity,
        };
        if !snapshot.covers(wanted) {
            return Err(insufficient);
        }
        match self.items.iter_mut().find(|i| i.product_id == snapshot.id) {
            Some(line) => line.reprice(snapshot, wanted),
            None => self.items.push(CartItem::new(snapshot.id, snapshot.name.clone(), wanted, snapshot.discounted_price())),
        }
        self.touch();
        Ok(())
    }

    pub fn update_quantity(&mut self, snapshot: &ProductSnapshot, quantity: Quantity) -> Result<(), CartError> {
        let line = self.items.iter_mut().find(|i| i.product_id == snapshot.id)
            .ok_or(CartError::ItemNotFound { product_id: snapshot.id })?;
        if !snapshot.covers(quantity) {
            return Err(CartError::InsufficientStock { product_id: snapshot.id, requested: quantity.get(), max_available: snapshot.stock });
        }
        line.reprice(snapshot, quantity);
        self.touch();
        Ok(())
    }

    /// Removing an absent line is a no-op; returns whether a line was removed.
    pub fn remove_item(&mut self, product_id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        let removed = self.items.len() != before;
        if removed { self.touch(); }
        removed
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    /// Called by stores after a successful write.
    pub fn mark_saved(&mut self, version: u64) { self.version = version; }

    fn recalculate(&mut self) {
        self.total_items = self.items.iter().map(|i| u64::from(i.quantity.get())).sum();
        self.total_price = self.items.iter().map(|i| i.subtotal).sum();
    }

    fn touch(&mut self) {
        self.recalculate();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("product {product_id} is out of stock")]
    OutOfStock { product_id: ProductId },

    #[error("only {max_available} more of product {product_id} can be added (requested {requested})")]
    InsufficientStock { product_id: ProductId, requested: u32, max_available: u32 },

    #[error("product {product_id} is not in the cart")]
    ItemNotFound { product_id: ProductId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::DiscountPercent;

    fn product(cents: i64, stock: u32) -> ProductSnapshot {
        ProductSnapshot::new(ProductId::new(), "Widget", Money::from_cents(cents), DiscountPercent::default(), stock)
    }

    fn qty(n: i64) -> Quantity { Quantity::new(n).unwrap() }

    fn assert_totals(cart: &Cart) {
        let price: Money = cart.items().iter().map(CartItem::subtotal).sum();
        let count: u64 = cart.items().iter().map(|i| u64::from(i.quantity().get())).sum();
        assert_eq!(cart.total_price(), price);
        assert_eq!(cart.total_items(), count);
    }

    #[test]
    fn test_add_creates_line_at_discounted_price() {
        let p1 = product(999, 5);
        let mut cart = Cart::empty(UserId::new());
        cart.add_item(&p1, qty(2)).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].subtotal(), Money::from_cents(1998));
        assert_eq!(cart.total_price(), Money::from_cents(1998));
        assert_totals(&cart);
    }

    #[test]
    fn test_add_merges_and_respects_stock() {
        let p1 = product(500, 3);
        let mut cart = Cart::empty(UserId::new());
        cart.add_item(&p1, qty(2)).unwrap();
        let err = cart.add_item(&p1, qty(2)).unwrap_err();
        assert_eq!(err, CartError::InsufficientStock { product_id: p1.id, requested: 2, max_available: 1 });
        assert_eq!(cart.items()[0].quantity(), qty(2));
        cart.add_item(&p1, qty(1)).unwrap();
        assert_eq!(cart.items()[0].quantity(), qty(3)); // Merged
        assert_totals(&cart);
    }

    #[test]
    fn test_add_out_of_stock() {
        let p1 = product(500, 0);
        let mut cart = Cart::empty(UserId::new());
        assert_eq!(cart.add_item(&p1, qty(1)), Err(CartError::OutOfStock { product_id: p1.id }));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_beyond_stock_leaves_cart_unchanged() {
        let p1 = product(999, 5);
        let mut cart = Cart::empty(UserId::new());
        cart.add_item(&p1, qty(2)).unwrap();
        let before = cart.clone();
        let err = cart.update_quantity(&p1, qty(10)).unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { max_available: 5, .. }));
        assert_eq!(cart.items(), before.items());
    }

    #[test]
    fn test_update_missing_line() {
        let mut cart = Cart::empty(UserId::new());
        let p1 = product(100, 5);
        assert!(matches!(cart.update_quantity(&p1, qty(1)), Err(CartError::ItemNotFound { .. })));
    }

    #[test]
    fn test_remove_is_idempotent_and_keeps_order() {
        let (p1, p2, p3) = (product(100, 5), product(200, 5), product(300, 5));
        let mut cart = Cart::empty(UserId::new());
        for p in [&p1, &p2, &p3] { cart.add_item(p, qty(1)).unwrap(); }
        assert!(cart.remove_item(p2.id));
        assert!(!cart.remove_item(p2.id));
        let ids: Vec<_> = cart.items().iter().map(CartItem::product_id).collect();
        assert_eq!(ids, vec![p1.id, p3.id]);
        assert_eq!(cart.total_price(), Money::from_cents(400));
        cart.clear();
        assert_eq!(cart.total_items(), 0);
        assert_eq!(cart.total_price(), Money::ZERO);
    }
}
