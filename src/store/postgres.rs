//! Postgres store. Each multi-record method runs in one transaction; stock rows
//! are locked in id order before any stock write so checkouts and cancels cannot
//! deadlock or oversell.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{OrderFilter, OrderTotals, StockShortfall, Store, StoreError};
use crate::domain::aggregates::{Cart, CartItem, Order, OrderItem, ProductSnapshot};
use crate::domain::value_objects::{DiscountPercent, Money, OrderId, ProductId, Quantity, UserId};

const PRODUCT_COLUMNS: &str = "id, name, price, discount_percent, stock";
const LOCK_STOCK_SQL: &str = "SELECT id, stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE";
const LOCK_PRODUCTS_SQL: &str = "SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE";
const DECREMENT_STOCK_SQL: &str = "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2";
const RESTOCK_SQL: &str = "UPDATE products SET stock = LEAST(stock::bigint + $2, 2147483647)::integer, updated_at = NOW() WHERE id = $1";
const SNAPSHOT_READ_SQL: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";
const LOCK_CART_SQL: &str = "SELECT version FROM carts WHERE user_id = $1 FOR UPDATE";
const GET_CART_SQL: &str = "SELECT user_id, version, created_at, updated_at FROM carts WHERE user_id = $1";
const GET_CART_ITEMS_SQL: &str = "SELECT product_id, product_name, quantity, unit_price FROM cart_items WHERE user_id = $1 ORDER BY position";
const INSERT_CART_SQL: &str = "INSERT INTO carts (user_id, version, created_at, updated_at) VALUES ($1, 1, $2, $3)";
const BUMP_CART_SQL: &str = "UPDATE carts SET version = version + 1, updated_at = $2 WHERE user_id = $1";
const DELETE_CART_ITEMS_SQL: &str = "DELETE FROM cart_items WHERE user_id = $1";
const INSERT_CART_ITEM_SQL: &str = "INSERT INTO cart_items (user_id, product_id, position, product_name, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6)";
const ORDER_COLUMNS: &str = "id, user_id, shipping_address, city, postal_code, country, status, payment_status, payment_method, total_amount, created_at, updated_at, shipped_date, estimated_delivery_date, delivered_date, tracking_number, payment_transaction_id, payment_date, version";
const INSERT_ORDER_SQL: &str = "INSERT INTO orders (id, user_id, shipping_address, city, postal_code, country, status, payment_status, payment_method, total_amount, created_at, updated_at, version) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1)";
const INSERT_ORDER_ITEM_SQL: &str = "INSERT INTO order_items (order_id, position, product_id, product_name_snapshot, unit_price, quantity, subtotal) VALUES ($1, $2, $3, $4, $5, $6, $7)";
const UPDATE_ORDER_SQL: &str = "UPDATE orders SET status = $3, payment_status = $4, payment_method = $5, updated_at = $6, shipped_date = $7, estimated_delivery_date = $8, delivered_date = $9, tracking_number = $10, payment_transaction_id = $11, payment_date = $12, version = version + 1 WHERE id = $1 AND version = $2";
const ORDER_ITEMS_SQL: &str = "SELECT order_id, product_id, product_name_snapshot, unit_price, quantity, subtotal FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position";
const ORDER_TOTALS_SQL: &str = "SELECT COUNT(*) AS total_orders, COALESCE(SUM(total_amount) FILTER (WHERE status <> 'cancelled'), 0) AS total_revenue, COUNT(*) FILTER (WHERE status = 'pending') AS pending_orders FROM orders";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(sqlx::Error::from)?;
        Ok(())
    }

    /// Locks the cart row and checks it still carries the version the caller read.
    async fn lock_cart(tx: &mut Transaction<'_, Postgres>, cart: &Cart) -> Result<bool, StoreError> {
        let stored: Option<i64> = sqlx::query_scalar(LOCK_CART_SQL)
            .bind(cart.user_id().as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        let version = stored.map(|v| to_u64(v, "carts.version")).transpose()?.unwrap_or(0);
        if version != cart.version() {
            return Err(StoreError::VersionConflict);
        }
        Ok(stored.is_some())
    }

    async fn write_cart_items(tx: &mut Transaction<'_, Postgres>, cart: &Cart) -> Result<(), StoreError> {
        let user = cart.user_id().as_uuid();
        sqlx::query(DELETE_CART_ITEMS_SQL).bind(user).execute(&mut **tx).await?;
        for (position, item) in cart.items().iter().enumerate() {
            sqlx::query(INSERT_CART_ITEM_SQL)
                .bind(user)
                .bind(item.product_id().as_uuid())
                .bind(to_i32(position as u64, "cart_items.position")?)
                .bind(item.product_name())
                .bind(to_i32(u64::from(item.quantity().get()), "cart_items.quantity")?)
                .bind(item.unit_price().amount())
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn load_order_items(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query(ORDER_ITEMS_SQL).bind(ids).fetch_all(&self.pool).await?;
        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            let quantity: i32 = row.try_get("quantity")?;
            items.entry(order_id).or_default().push(OrderItem {
                product_id: ProductId::from_uuid(row.try_get("product_id")?),
                product_name_snapshot: row.try_get("product_name_snapshot")?,
                unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?),
                quantity: to_quantity(quantity, "order_items.quantity")?,
                subtotal: Money::new(row.try_get::<Decimal, _>("subtotal")?),
            });
        }
        Ok(items)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.try_get("id")).collect::<Result<_, _>>()?;
        let mut items = self.load_order_items(&ids).await?;
        rows.iter().map(|row| {
            let id: Uuid = row.try_get("id")?;
            order_from_row(row, items.remove(&id).unwrap_or_default())
        }).collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<ProductSnapshot>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
        let rows = sqlx::query(&sql).bind(&ids).fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn set_stock(&self, id: ProductId, stock: u32, expected: Option<u32>) -> Result<(ProductSnapshot, u32), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let previous = to_u32(current.ok_or(StoreError::ProductNotFound(id))?, "products.stock")?;
        if expected.is_some_and(|e| e != previous) {
            return Err(StoreError::StockMismatch { product_id: id, current: previous });
        }
        let sql = format!("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1 RETURNING {PRODUCT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(to_i32(u64::from(stock), "products.stock")?)
            .fetch_one(&mut *tx)
            .await?;
        let product = product_from_row(&row)?;
        tx.commit().await?;
        Ok((product, previous))
    }

    async fn count_low_stock(&self, threshold: u32) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE stock < $1")
            .bind(i64::from(threshold))
            .fetch_one(&self.pool)
            .await?;
        to_u64(count, "count")
    }

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>, StoreError> {
        // Header and lines come from one snapshot so the version matches the items.
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_READ_SQL).execute(&mut *tx).await?;
        let Some(row) = sqlx::query(GET_CART_SQL).bind(user_id.as_uuid()).fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };
        let rows = sqlx::query(GET_CART_ITEMS_SQL).bind(user_id.as_uuid()).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        let items = rows.iter().map(|r| {
            let quantity: i32 = r.try_get("quantity")?;
            Ok(CartItem::new(
                ProductId::from_uuid(r.try_get("product_id")?),
                r.try_get::<String, _>("product_name")?,
                to_quantity(quantity, "cart_items.quantity")?,
                Money::new(r.try_get::<Decimal, _>("unit_price")?),
            ))
        }).collect::<Result<Vec<_>, StoreError>>()?;
        Ok(Some(Cart::restore(
            user_id,
            items,
            to_u64(row.try_get("version")?, "carts.version")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        )))
    }

    async fn save_cart(&self, mut cart: Cart) -> Result<Cart, StoreError> {
        let mut tx = self.pool.begin().await?;
        let exists = Self::lock_cart(&mut tx, &cart).await?;
        if exists {
            sqlx::query(BUMP_CART_SQL).bind(cart.user_id().as_uuid()).bind(cart.updated_at()).execute(&mut *tx).await?;
        } else {
            sqlx::query(INSERT_CART_SQL)
                .bind(cart.user_id().as_uuid())
                .bind(cart.created_at())
                .bind(cart.updated_at())
                .execute(&mut *tx)
                .await?;
        }
        Self::write_cart_items(&mut tx, &cart).await?;
        tx.commit().await?;
        cart.mark_saved(cart.version() + 1);
        Ok(cart)
    }

    async fn commit_checkout(&self, cart: &Cart, mut order: Order) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let cart_exists = Self::lock_cart(&mut tx, cart).await?;

        let ids: Vec<Uuid> = order.items().iter().map(|i| i.product_id.as_uuid()).collect();
        let rows = sqlx::query(LOCK_STOCK_SQL).bind(&ids).fetch_all(&mut *tx).await?;
        let mut stock: HashMap<Uuid, u32> = HashMap::with_capacity(rows.len());
        for row in &rows {
            stock.insert(row.try_get("id")?, to_u32(row.try_get("stock")?, "products.stock")?);
        }
        let shortfalls: Vec<StockShortfall> = order.items().iter().filter_map(|i| {
            let available = stock.get(&i.product_id.as_uuid()).copied().unwrap_or(0);
            (i.quantity.get() > available).then_some(StockShortfall { product_id: i.product_id, requested: i.quantity.get(), available })
        }).collect();
        if !shortfalls.is_empty() {
            return Err(StoreError::Shortfall(shortfalls));
        }

        for item in order.items() {
            let affected = sqlx::query(DECREMENT_STOCK_SQL)
                .bind(item.product_id.as_uuid())
                .bind(to_i32(u64::from(item.quantity.get()), "products.stock")?)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if affected != 1 {
                let available = stock.get(&item.product_id.as_uuid()).copied().unwrap_or(0);
                return Err(StoreError::Shortfall(vec![StockShortfall { product_id: item.product_id, requested: item.quantity.get(), available }]));
            }
        }

        sqlx::query(INSERT_ORDER_SQL)
            .bind(order.id().as_uuid())
            .bind(order.user_id().as_uuid())
            .bind(order.shipping_address())
            .bind(order.city())
            .bind(order.postal_code())
            .bind(order.country())
            .bind(order.status().as_str())
            .bind(order.payment_status().as_str())
            .bind(order.payment_method())
            .bind(order.total_amount().amount())
            .bind(order.created_at())
            .bind(order.updated_at())
            .execute(&mut *tx)
            .await?;
        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(INSERT_ORDER_ITEM_SQL)
                .bind(order.id().as_uuid())
                .bind(to_i32(position as u64, "order_items.position")?)
                .bind(item.product_id.as_uuid())
                .bind(&item.product_name_snapshot)
                .bind(item.unit_price.amount())
                .bind(to_i32(u64::from(item.quantity.get()), "order_items.quantity")?)
                .bind(item.subtotal.amount())
                .execute(&mut *tx)
                .await?;
        }

        if cart_exists {
            sqlx::query(DELETE_CART_ITEMS_SQL).bind(cart.user_id().as_uuid()).execute(&mut *tx).await?;
            sqlx::query(BUMP_CART_SQL).bind(cart.user_id().as_uuid()).bind(order.created_at()).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        order.mark_saved(1);
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        );
        let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query(&sql)
            .bind(filter.user_id.map(|u| u.as_uuid()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    async fn save_order(&self, mut order: Order, restock: &[(ProductId, Quantity)]) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query(UPDATE_ORDER_SQL)
            .bind(order.id().as_uuid())
            .bind(to_i64(order.version(), "orders.version")?)
            .bind(order.status().as_str())
            .bind(order.payment_status().as_str())
            .bind(order.payment_method())
            .bind(order.updated_at())
            .bind(order.shipped_date())
            .bind(order.estimated_delivery_date())
            .bind(order.delivered_date())
            .bind(order.tracking_number())
            .bind(order.payment_transaction_id())
            .bind(order.payment_date())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            let exists = sqlx::query("SELECT 1 FROM orders WHERE id = $1")
                .bind(order.id().as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return Err(if exists { StoreError::VersionConflict } else { StoreError::OrderNotFound(order.id()) });
        }
        if !restock.is_empty() {
            // Same lock order as checkout: product rows by id.
            let mut restock = restock.to_vec();
            restock.sort_by_key(|(product_id, _)| product_id.as_uuid());
            let ids: Vec<Uuid> = restock.iter().map(|(product_id, _)| product_id.as_uuid()).collect();
            let locked: Vec<Uuid> = sqlx::query_scalar(LOCK_PRODUCTS_SQL)
                .bind(&ids)
                .fetch_all(&mut *tx)
                .await?;
            if let Some((missing, _)) = restock.iter().find(|(product_id, _)| !locked.contains(&product_id.as_uuid())) {
                return Err(StoreError::ProductNotFound(*missing));
            }
            for (product_id, qty) in &restock {
                sqlx::query(RESTOCK_SQL)
                    .bind(product_id.as_uuid())
                    .bind(i64::from(qty.get()))
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        order.mark_saved(order.version() + 1);
        Ok(order)
    }

    async fn order_totals(&self) -> Result<OrderTotals, StoreError> {
        let row = sqlx::query(ORDER_TOTALS_SQL).fetch_one(&self.pool).await?;
        Ok(OrderTotals {
            total_orders: to_u64(row.try_get("total_orders")?, "total_orders")?,
            total_revenue: Money::new(row.try_get::<Decimal, _>("total_revenue")?),
            pending_orders: to_u64(row.try_get("pending_orders")?, "pending_orders")?,
        })
    }
}

fn product_from_row(row: &PgRow) -> Result<ProductSnapshot, StoreError> {
    let discount: i16 = row.try_get("discount_percent")?;
    let discount = u8::try_from(discount).ok().and_then(DiscountPercent::new)
        .ok_or_else(|| StoreError::Corrupt(format!("products.discount_percent = {discount}")))?;
    Ok(ProductSnapshot::new(
        ProductId::from_uuid(row.try_get("id")?),
        row.try_get::<String, _>("name")?,
        Money::new(row.try_get::<Decimal, _>("price")?),
        discount,
        to_u32(row.try_get("stock")?, "products.stock")?,
    ))
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        items,
        shipping_address: row.try_get("shipping_address")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        status: status.parse().map_err(|e| StoreError::Corrupt(format!("orders.status: {e}")))?,
        payment_status: payment_status.parse().map_err(|e| StoreError::Corrupt(format!("orders.payment_status: {e}")))?,
        payment_method: row.try_get("payment_method")?,
        total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        shipped_date: row.try_get("shipped_date")?,
        estimated_delivery_date: row.try_get("estimated_delivery_date")?,
        delivered_date: row.try_get("delivered_date")?,
        tracking_number: row.try_get("tracking_number")?,
        payment_transaction_id: row.try_get("payment_transaction_id")?,
        payment_date: row.try_get("payment_date")?,
        version: to_u64(row.try_get("version")?, "orders.version")?,
    })
}

fn to_quantity(value: i32, column: &str) -> Result<Quantity, StoreError> {
    Quantity::new(i64::from(value)).ok_or_else(|| StoreError::Corrupt(format!("{column} = {value}")))
}

fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} = {value}")))
}

fn to_i32(value: u64, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}
