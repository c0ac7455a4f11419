//! Back-office operations: absolute stock edits and the dashboard.

use tracing::{info, instrument};

use super::{Caller, DashboardStats, Storefront};
use crate::domain::aggregates::ProductSnapshot;
use crate::domain::events::StorefrontEvent;
use crate::domain::value_objects::ProductId;
use crate::store::OrderFilter;
use crate::{Result, StorefrontError};

impl Storefront {
    /// Overwrites a product's stock. When `expected` is given the write is a
    /// compare-and-set and fails with [`StorefrontError::StockConflict`] if
    /// checkouts or cancellations moved the count in the meantime.
    #[instrument(skip_all, fields(caller = %caller.user_id, %product_id, stock = stock))]
    pub async fn set_stock(
        &self,
        caller: &Caller,
        product_id: ProductId,
        stock: i64,
        expected: Option<i64>,
    ) -> Result<ProductSnapshot> {
        caller.require_admin()?;
        let stock = stock_count(stock)?;
        let expected = expected.map(stock_count).transpose()?;

        let (product, previous) = self.store.set_stock(product_id, stock, expected).await?;
        info!(previous, "stock adjusted");
        self.publish(StorefrontEvent::StockAdjusted { product_id, previous, stock }).await;
        Ok(product)
    }

    #[instrument(skip_all, fields(caller = %caller.user_id))]
    pub async fn dashboard_stats(&self, caller: &Caller) -> Result<DashboardStats> {
        caller.require_admin()?;
        let totals = self.store.order_totals().await?;
        let low_stock_products = self.store.count_low_stock(self.settings.low_stock_threshold).await?;
        let recent = OrderFilter { limit: Some(self.settings.recent_orders_limit), ..OrderFilter::default() };
        let recent_orders = self.store.orders(&recent).await?;
        Ok(DashboardStats {
            total_orders: totals.total_orders,
            total_revenue: totals.total_revenue,
            pending_orders: totals.pending_orders,
            low_stock_products,
            recent_orders,
        })
    }
}

fn stock_count(value: i64) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|count| *count <= ProductSnapshot::MAX_STOCK)
        .ok_or(StorefrontError::InvalidQuantity)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::domain::aggregates::{OrderStatus, ShipmentDetails, ShippingInfo};
    use crate::domain::value_objects::{Money, UserId};
    use crate::services::test_support::{fixture, product};
    use crate::services::StorefrontSettings;
    use crate::store::Store;

    #[tokio::test]
    async fn set_stock_overwrites_and_publishes() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let admin = Caller::admin(UserId::new());
        let updated = fx.storefront.set_stock(&admin, p1.id, 12, None).await?;
        assert_eq!(updated.stock, 12);
        assert_eq!(
            fx.events.events().await,
            vec![StorefrontEvent::StockAdjusted { product_id: p1.id, previous: 5, stock: 12 }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn set_stock_rejects_bad_input() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let admin = Caller::admin(UserId::new());
        assert!(matches!(fx.storefront.set_stock(&admin, p1.id, -1, None).await, Err(StorefrontError::InvalidQuantity)));
        let too_many = i64::from(ProductSnapshot::MAX_STOCK) + 1;
        assert!(matches!(fx.storefront.set_stock(&admin, p1.id, too_many, None).await, Err(StorefrontError::InvalidQuantity)));
        assert!(matches!(fx.storefront.set_stock(&admin, p1.id, 1, Some(too_many)).await, Err(StorefrontError::InvalidQuantity)));
        assert_eq!(fx.storefront.set_stock(&admin, p1.id, i64::from(ProductSnapshot::MAX_STOCK), None).await?.stock, ProductSnapshot::MAX_STOCK);
        fx.storefront.set_stock(&admin, p1.id, 5, None).await?;
        assert!(matches!(
            fx.storefront.set_stock(&Caller::shopper(UserId::new()), p1.id, 1, None).await,
            Err(StorefrontError::Forbidden)
        ));
        let missing = ProductId::new();
        assert!(matches!(
            fx.storefront.set_stock(&admin, missing, 1, None).await,
            Err(StorefrontError::ProductNotFound { product_id }) if product_id == missing
        ));
        assert_eq!(fx.store.product(p1.id).await?.map(|p| p.stock), Some(5));
        Ok(())
    }

    #[tokio::test]
    async fn set_stock_with_stale_expectation_conflicts() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let fx = fixture(vec![p1.clone()]);
        let user = UserId::new();
        fx.storefront.add_item(user, p1.id, 2).await?;
        fx.storefront.checkout(user, ShippingInfo::default()).await?;

        let admin = Caller::admin(UserId::new());
        let err = fx.storefront.set_stock(&admin, p1.id, 20, Some(5)).await.unwrap_err();
        assert!(matches!(err, StorefrontError::StockConflict { current: 3, .. }), "got {err:?}");
        assert_eq!(fx.storefront.set_stock(&admin, p1.id, 20, Some(3)).await?.stock, 20);
        Ok(())
    }

    #[tokio::test]
    async fn dashboard_counts_orders_revenue_and_low_stock() -> TestResult {
        let (p1, p2) = (product("Mug", 1000, 50), product("Tea", 500, 4));
        let fx = fixture(vec![p1.clone(), p2.clone()]);
        let storefront = fx.storefront.with_settings(StorefrontSettings { low_stock_threshold: 10, recent_orders_limit: 2 });
        let admin = Caller::admin(UserId::new());

        let mut placed = Vec::new();
        for _ in 0..3 {
            let user = UserId::new();
            storefront.add_item(user, p1.id, 1).await?;
            placed.push(storefront.checkout(user, ShippingInfo::default()).await?);
        }
        storefront.update_status(&admin, placed[0].id(), OrderStatus::Cancelled, ShipmentDetails::default()).await?;
        storefront.update_status(&admin, placed[1].id(), OrderStatus::Processing, ShipmentDetails::default()).await?;

        let stats = storefront.dashboard_stats(&admin).await?;
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.total_revenue, Money::from_cents(2000));
        assert_eq!(stats.pending_orders, 1);
        assert_eq!(stats.low_stock_products, 1);
        assert_eq!(stats.recent_orders.len(), 2);

        let shopper = Caller::shopper(UserId::new());
        assert!(matches!(storefront.dashboard_stats(&shopper).await, Err(StorefrontError::Forbidden)));
        Ok(())
    }
}
