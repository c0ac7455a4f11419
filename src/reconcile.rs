//! Reconciliation Layer
//!
//! Every mutation answers with authoritative state. A success carries the new
//! object; a failure carries the error together with whatever the server now
//! holds, so a client that applied an optimistic guess can drop it and adopt
//! the real state instead of refetching.

use tracing::debug;

use crate::domain::aggregates::{Cart, Order, ProductSnapshot};
use crate::domain::value_objects::{OrderId, ProductId, UserId};
use crate::services::{Caller, Storefront};
use crate::{Result, StorefrontError};

/// A failed mutation plus the state the client should revert to.
#[derive(Debug)]
pub struct Rejection<C> {
    pub error: StorefrontError,
    /// `None` when the current state could not be read, or there is none the
    /// caller is allowed to see.
    pub current: Option<C>,
}

/// Outcome of a mutation. `C` is the kind of state a client reverts to, which
/// differs from `T` only for checkout (it returns an order but fails back to
/// the cart).
pub type Reconciled<T, C = T> = std::result::Result<T, Rejection<C>>;

impl<C> Rejection<C> {
    pub fn new(error: StorefrontError, current: Option<C>) -> Self { Self { error, current } }

    pub fn into_parts(self) -> (StorefrontError, Option<C>) { (self.error, self.current) }
}

impl Storefront {
    /// Attaches the user's current cart to a failed cart mutation.
    pub async fn reconcile_cart(&self, user_id: UserId, outcome: Result<Cart>) -> Reconciled<Cart> {
        match outcome {
            Ok(cart) => Ok(cart),
            Err(error) => Err(Rejection::new(error, self.current_cart(user_id).await)),
        }
    }

    /// A failed checkout leaves the cart untouched, so the cart is what the
    /// client reverts to.
    pub async fn reconcile_checkout(&self, user_id: UserId, outcome: Result<Order>) -> Reconciled<Order, Cart> {
        match outcome {
            Ok(order) => Ok(order),
            Err(error) => Err(Rejection::new(error, self.current_cart(user_id).await)),
        }
    }

    /// Attaches the current order to a failed lifecycle change. Callers that
    /// may not read the order get no state back.
    pub async fn reconcile_order(&self, caller: &Caller, order_id: OrderId, outcome: Result<Order>) -> Reconciled<Order> {
        match outcome {
            Ok(order) => Ok(order),
            Err(error @ (StorefrontError::Forbidden | StorefrontError::OrderNotFound { .. })) => {
                Err(Rejection::new(error, None))
            }
            Err(error) => {
                let current = match self.get_order(caller, order_id).await {
                    Ok(order) => Some(order),
                    Err(lookup) => {
                        debug!(%order_id, error = %lookup, "no current order to reconcile with");
                        None
                    }
                };
                Err(Rejection::new(error, current))
            }
        }
    }

    /// Attaches the product's current stock to a failed stock edit.
    pub async fn reconcile_product(
        &self,
        product_id: ProductId,
        outcome: Result<ProductSnapshot>,
    ) -> Reconciled<ProductSnapshot> {
        match outcome {
            Ok(product) => Ok(product),
            Err(error @ (StorefrontError::Forbidden | StorefrontError::ProductNotFound { .. })) => {
                Err(Rejection::new(error, None))
            }
            Err(error) => Err(Rejection::new(error, self.snapshot(product_id).await.ok())),
        }
    }

    async fn current_cart(&self, user_id: UserId) -> Option<Cart> {
        match self.get_cart(user_id).await {
            Ok(cart) => Some(cart),
            Err(error) => {
                debug!(%user_id, %error, "no current cart to reconcile with");
                None
            }
        }
    }
}

/// Client-side view that may run ahead of the server by one optimistic guess.
///
/// The guess is never merged: once the outcome arrives the view holds exactly
/// the authoritative state it carried, or the last confirmed state if the
/// failure came back without one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimisticView<T> {
    confirmed: T,
    pending: Option<T>,
}

impl<T> OptimisticView<T> {
    pub fn new(confirmed: T) -> Self { Self { confirmed, pending: None } }

    /// What the client should render right now.
    pub fn current(&self) -> &T { self.pending.as_ref().unwrap_or(&self.confirmed) }

    pub fn confirmed(&self) -> &T { &self.confirmed }
    pub fn is_pending(&self) -> bool { self.pending.is_some() }

    /// Shows `guess` until the matching outcome is settled.
    pub fn apply(&mut self, guess: T) { self.pending = Some(guess); }

    /// Replaces the view with the authoritative outcome and hands back the
    /// error, if any, for presentation.
    pub fn settle(&mut self, outcome: Reconciled<T>) -> Result<()> {
        self.pending = None;
        match outcome {
            Ok(state) => {
                self.confirmed = state;
                Ok(())
            }
            Err(Rejection { error, current }) => {
                if let Some(state) = current { self.confirmed = state; }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::domain::aggregates::{OrderStatus, ShipmentDetails, ShippingInfo};
    use crate::services::test_support::{fixture, product};
    use crate::store::Store;

    #[tokio::test]
    async fn failed_cart_mutation_returns_current_cart() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let user = UserId::new();
        let before = fx.storefront.add_item(user, p1.id, 2).await?;

        let outcome = fx.storefront.update_item(user, p1.id, 10).await;
        let rejection = fx.storefront.reconcile_cart(user, outcome).await.unwrap_err();
        assert!(matches!(rejection.error, StorefrontError::InsufficientStock { .. }));
        assert_eq!(rejection.current, Some(before));
        Ok(())
    }

    #[tokio::test]
    async fn failed_checkout_returns_untouched_cart() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let user = UserId::new();
        let cart = fx.storefront.add_item(user, p1.id, 2).await?;
        fx.store.set_stock(p1.id, 1, None).await?;

        let outcome = fx.storefront.checkout(user, ShippingInfo::default()).await;
        let (error, current) = fx.storefront.reconcile_checkout(user, outcome).await.unwrap_err().into_parts();
        assert!(matches!(error, StorefrontError::StockChanged { .. }));
        assert_eq!(current, Some(cart));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_transition_returns_current_order() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let user = UserId::new();
        fx.storefront.add_item(user, p1.id, 1).await?;
        let order = fx.storefront.checkout(user, ShippingInfo::default()).await?;
        let admin = Caller::admin(UserId::new());

        let outcome = fx.storefront.update_status(&admin, order.id(), OrderStatus::Shipped, ShipmentDetails::default()).await;
        let rejection = fx.storefront.reconcile_order(&admin, order.id(), outcome).await.unwrap_err();
        assert!(matches!(rejection.error, StorefrontError::InvalidTransition { .. }));
        assert_eq!(rejection.current.map(|o| o.status()), Some(OrderStatus::Pending));

        let shopper = Caller::shopper(user);
        let outcome = fx.storefront.update_status(&shopper, order.id(), OrderStatus::Processing, ShipmentDetails::default()).await;
        let rejection = fx.storefront.reconcile_order(&shopper, order.id(), outcome).await.unwrap_err();
        assert!(matches!(rejection.error, StorefrontError::Forbidden));
        assert!(rejection.current.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stock_conflict_returns_current_product() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let admin = Caller::admin(UserId::new());
        let outcome = fx.storefront.set_stock(&admin, p1.id, 8, Some(2)).await;
        let rejection = fx.storefront.reconcile_product(p1.id, outcome).await.unwrap_err();
        assert!(matches!(rejection.error, StorefrontError::StockConflict { current: 5, .. }));
        assert_eq!(rejection.current.map(|p| p.stock), Some(5));
        Ok(())
    }

    #[test]
    fn view_adopts_server_state_on_success() {
        let mut view = OptimisticView::new(1);
        view.apply(3);
        assert_eq!(*view.current(), 3);
        assert!(view.is_pending());
        assert!(view.settle(Ok(2)).is_ok());
        assert_eq!(*view.current(), 2);
        assert!(!view.is_pending());
    }

    #[test]
    fn view_reverts_on_failure() {
        let mut view = OptimisticView::new(1);
        view.apply(3);
        let err = view.settle(Err(Rejection::new(StorefrontError::Conflict, Some(5)))).unwrap_err();
        assert!(matches!(err, StorefrontError::Conflict));
        assert_eq!(*view.current(), 5);

        view.apply(9);
        assert!(view.settle(Err(Rejection::new(StorefrontError::EmptyCart, None))).is_err());
        assert_eq!(*view.current(), 5);
    }
}
