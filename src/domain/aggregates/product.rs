//! Product Snapshot
//!
//! The catalog owns products; the core only ever sees a read-only snapshot of
//! the fields it needs, fetched fresh whenever it has to make a decision.

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{DiscountPercent, Money, ProductId, Quantity};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub discount_percent: DiscountPercent,
    pub stock: u32,
}

impl ProductSnapshot {
    /// Largest stock count the storage schema can hold.
    pub const MAX_STOCK: u32 = i32::MAX as u32;

    pub fn new(id: ProductId, name: impl Into<String>, price: Money, discount_percent: DiscountPercent, stock: u32) -> Self {
        Self { id, name: name.into(), price, discount_percent, stock }
    }

    pub fn discounted_price(&self) -> Money { self.price.discounted(self.discount_percent) }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn covers(&self, qty: Quantity) -> bool { qty.get() <= self.stock }
    pub fn is_low_stock(&self, threshold: u32) -> bool { self.stock < threshold }

    /// Guarded decrement: leaves stock untouched and returns what is available
    /// when the request cannot be covered.
    pub fn take_stock(&mut self, qty: Quantity) -> Result<(), u32> {
        self.stock = self.stock.checked_sub(qty.get()).ok_or(self.stock)?;
        Ok(())
    }

    /// Returns units to stock, capped at [`Self::MAX_STOCK`].
    pub fn restock(&mut self, qty: Quantity) { self.stock = self.stock.saturating_add(qty.get()).min(Self::MAX_STOCK); }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(stock: u32) -> ProductSnapshot {
        ProductSnapshot::new(ProductId::new(), "Widget", Money::from_cents(1110), DiscountPercent::new(10).unwrap(), stock)
    }

    #[test]
    fn test_discounted_price() {
        assert_eq!(widget(1).discounted_price(), Money::from_cents(999));
    }

    #[test]
    fn test_take_stock_is_guarded() {
        let mut p = widget(3);
        assert_eq!(p.take_stock(Quantity::new(4).unwrap()), Err(3));
        assert_eq!(p.stock, 3);
        p.take_stock(Quantity::new(3).unwrap()).unwrap();
        assert!(!p.is_in_stock());
        p.restock(Quantity::new(2).unwrap());
        assert_eq!(p.stock, 2);
    }

    #[test]
    fn test_restock_is_capped() {
        let mut p = widget(ProductSnapshot::MAX_STOCK - 1);
        p.restock(Quantity::new(5).unwrap());
        assert_eq!(p.stock, ProductSnapshot::MAX_STOCK);
    }
}
