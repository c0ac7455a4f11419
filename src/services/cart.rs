//! Cart Store operations. Each mutation is a read-modify-write of the user's
//! single cart record, serialized by the per-user lock.

use tracing::{debug, instrument};

use super::Storefront;
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::{ProductId, Quantity, UserId};
use crate::{Result, StorefrontError};

impl Storefront {
    /// The user's cart, or an empty one if they never added anything.
    #[instrument(skip_all, fields(%user_id))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        self.load_cart(user_id).await
    }

    #[instrument(skip_all, fields(%user_id, %product_id))]
    pub async fn add_item(&self, user_id: UserId, product_id: ProductId, quantity: i64) -> Result<Cart> {
        let quantity = Quantity::new(quantity).ok_or(StorefrontError::InvalidQuantity)?;
        let _guard = self.cart_locks.acquire(&user_id).await;
        let snapshot = self.snapshot(product_id).await?;
        let mut cart = self.load_cart(user_id).await?;
        cart.add_item(&snapshot, quantity)?;
        let cart = self.store.save_cart(cart).await?;
        debug!(total_items = cart.total_items(), "item added to cart");
        Ok(cart)
    }

    /// Sets a line to an exact quantity. Zero is rejected; use
    /// [`Storefront::remove_item`] to drop a line.
    #[instrument(skip_all, fields(%user_id, %product_id))]
    pub async fn update_item(&self, user_id: UserId, product_id: ProductId, quantity: i64) -> Result<Cart> {
        let quantity = Quantity::new(quantity).ok_or(StorefrontError::InvalidQuantity)?;
        let _guard = self.cart_locks.acquire(&user_id).await;
        let mut cart = self.load_cart(user_id).await?;
        if cart.item(product_id).is_none() {
            return Err(StorefrontError::ItemNotFound { product_id });
        }
        let snapshot = self.snapshot(product_id).await?;
        cart.update_quantity(&snapshot, quantity)?;
        let cart = self.store.save_cart(cart).await?;
        debug!(total_items = cart.total_items(), "cart item updated");
        Ok(cart)
    }

    #[instrument(skip_all, fields(%user_id, %product_id))]
    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<Cart> {
        let _guard = self.cart_locks.acquire(&user_id).await;
        let mut cart = self.load_cart(user_id).await?;
        if !cart.remove_item(product_id) {
            return Ok(cart);
        }
        Ok(self.store.save_cart(cart).await?)
    }
}
