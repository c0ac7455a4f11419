//! Value Objects for the storefront core

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use uuid::Uuid;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self { Self(Uuid::now_v7()) }
            pub const fn from_uuid(uuid: Uuid) -> Self { Self(uuid) }
            pub const fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl Default for $name { fn default() -> Self { Self::new() } }
        impl From<Uuid> for $name { fn from(uuid: Uuid) -> Self { Self(uuid) } }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(&self.0, f) }
        }
    };
}

typed_id!(
    /// Identity of an authenticated shopper, issued outside the core.
    UserId
);
typed_id!(
    /// Catalog product id.
    ProductId
);
typed_id!(
    /// Order id, assigned at checkout.
    OrderId
);

/// Money value object, always held at currency precision (two decimal places).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0 + other.0) }
    pub fn multiply(&self, qty: Quantity) -> Money { Money::new(self.0 * Decimal::from(qty.get())) }

    /// Applies a percentage discount and rounds half away from zero to cents.
    pub fn discounted(&self, discount: DiscountPercent) -> Money {
        let factor = Decimal::ONE - Decimal::from(discount.get()) / Decimal::ONE_HUNDRED;
        Money::new(self.0 * factor)
    }
}

impl From<Decimal> for Money { fn from(amount: Decimal) -> Self { Money::new(amount) } }
impl From<Money> for Decimal { fn from(money: Money) -> Self { money.0 } }

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self { iter.fold(Money::ZERO, |acc, m| acc.add(m)) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Strictly positive line quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Returns `None` for zero, negative or out-of-range values.
    pub fn new(value: i64) -> Option<Self> {
        u32::try_from(value).ok().filter(|v| *v > 0).map(Self)
    }
    pub fn get(&self) -> u32 { self.0 }
    pub fn checked_add(&self, other: Quantity) -> Option<Self> { self.0.checked_add(other.0).map(Self) }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Quantity::new(value).ok_or(QuantityError(value)) }
}

impl From<Quantity> for u32 { fn from(q: Quantity) -> Self { q.0 } }

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct QuantityError(pub i64);
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "quantity must be a positive integer, got {}", self.0) }
}

/// Discount percentage in `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DiscountPercent(u8);

impl DiscountPercent {
    pub fn new(value: u8) -> Option<Self> { (value <= 100).then_some(Self(value)) }
    pub fn get(&self) -> u8 { self.0 }
}

impl TryFrom<u8> for DiscountPercent {
    type Error = DiscountError;
    fn try_from(value: u8) -> Result<Self, Self::Error> { DiscountPercent::new(value).ok_or(DiscountError(value)) }
}

impl From<DiscountPercent> for u8 { fn from(d: DiscountPercent) -> Self { d.0 } }

#[derive(Debug, Clone, PartialEq, Eq)] pub struct DiscountError(pub u8);
impl std::error::Error for DiscountError {}
impl fmt::Display for DiscountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "discount {} is outside 0..=100", self.0) }
}
