//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::ProductSnapshot;
pub use order::{Order, OrderError, OrderItem, OrderStatus, PaymentStatus, PaymentUpdate, ShipmentDetails, ShippingInfo, Transition, UnknownStatus};
pub use cart::{Cart, CartError, CartItem};
