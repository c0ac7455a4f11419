use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use super::error::ApiError;
use super::identity::Identity;
use crate::domain::aggregates::{
    Cart, Order, OrderStatus, PaymentStatus, PaymentUpdate, ProductSnapshot, ShipmentDetails, ShippingInfo,
};
use crate::domain::value_objects::{OrderId, ProductId, UserId};
use crate::reconcile::Reconciled;
use crate::services::{DashboardStats, OrderFilter, Storefront};
use crate::StorefrontError;

type AppState = State<Arc<Storefront>>;
pub type ApiResult<T> = Result<Json<Data<T>>, ApiError>;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

fn ok<T>(data: T) -> ApiResult<T> { Ok(Json(Data { data })) }

fn settle<T, C: Serialize>(outcome: Reconciled<T, C>) -> ApiResult<T> {
    outcome.map(|data| Json(Data { data })).map_err(ApiError::from)
}

/// Fields whose type or validation failures are reported as `invalid_quantity`.
const QUANTITY_FIELDS: [&str; 3] = ["quantity", "stock", "expected"];

/// A quantity field present in the body that is not a whole number.
fn has_malformed_quantity(body: &Value) -> bool {
    QUANTITY_FIELDS
        .iter()
        .filter_map(|field| body.get(field))
        .any(|value| !value.is_null() && !value.is_i64())
}

/// JSON body that has passed its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        if has_malformed_quantity(&body) {
            return Err(StorefrontError::InvalidQuantity.into());
        }
        let value: T = serde_json::from_value(body).map_err(|error| ApiError::BadRequest(error.to_string()))?;
        value.validate().map_err(|errors| {
            if errors.field_errors().keys().any(|field| QUANTITY_FIELDS.contains(field)) {
                ApiError::from(StorefrontError::InvalidQuantity)
            } else {
                ApiError::BadRequest(errors.to_string())
            }
        })?;
        Ok(Self(value))
    }
}

fn default_quantity() -> i64 { 1 }

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 255))]
    pub shipping_address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
}

impl From<CheckoutRequest> for ShippingInfo {
    fn from(r: CheckoutRequest) -> Self {
        ShippingInfo {
            shipping_address: r.shipping_address,
            city: r.city,
            postal_code: r.postal_code,
            country: r.country,
            payment_method: r.payment_method,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    pub status: OrderStatus,
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    pub status: PaymentStatus,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StockRequest {
    #[validate(range(min = 0))]
    pub stock: i64,
    #[validate(range(min = 0))]
    pub expected: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
    pub limit: Option<usize>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "storefront-core" }))
}

pub async fn get_cart(State(sf): AppState, Identity(caller): Identity) -> ApiResult<Cart> {
    ok(sf.get_cart(caller.user_id).await?)
}

pub async fn add_item(
    State(sf): AppState,
    Identity(caller): Identity,
    ValidatedJson(body): ValidatedJson<AddItemRequest>,
) -> ApiResult<Cart> {
    let outcome = sf.add_item(caller.user_id, body.product_id, body.quantity).await;
    settle(sf.reconcile_cart(caller.user_id, outcome).await)
}

pub async fn update_item(
    State(sf): AppState,
    Identity(caller): Identity,
    Path(product_id): Path<ProductId>,
    ValidatedJson(body): ValidatedJson<UpdateItemRequest>,
) -> ApiResult<Cart> {
    let outcome = sf.update_item(caller.user_id, product_id, body.quantity).await;
    settle(sf.reconcile_cart(caller.user_id, outcome).await)
}

pub async fn remove_item(
    State(sf): AppState,
    Identity(caller): Identity,
    Path(product_id): Path<ProductId>,
) -> ApiResult<Cart> {
    let outcome = sf.remove_item(caller.user_id, product_id).await;
    settle(sf.reconcile_cart(caller.user_id, outcome).await)
}

pub async fn checkout(
    State(sf): AppState,
    Identity(caller): Identity,
    ValidatedJson(body): ValidatedJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<Data<Order>>), ApiError> {
    let outcome = sf.checkout(caller.user_id, body.into()).await;
    let order = settle(sf.reconcile_checkout(caller.user_id, outcome).await)?;
    Ok((StatusCode::CREATED, order))
}

pub async fn list_orders(State(sf): AppState, Identity(caller): Identity) -> ApiResult<Vec<Order>> {
    ok(sf.list_orders(caller.user_id).await?)
}

pub async fn get_order(
    State(sf): AppState,
    Identity(caller): Identity,
    Path(order_id): Path<OrderId>,
) -> ApiResult<Order> {
    ok(sf.get_order(&caller, order_id).await?)
}

pub async fn admin_list_orders(
    State(sf): AppState,
    Identity(caller): Identity,
    Query(query): Query<OrderQuery>,
) -> ApiResult<Vec<Order>> {
    let filter = OrderFilter { user_id: query.user_id, status: query.status, limit: query.limit };
    ok(sf.list_all_orders(&caller, filter).await?)
}

pub async fn update_status(
    State(sf): AppState,
    Identity(caller): Identity,
    Path(order_id): Path<OrderId>,
    ValidatedJson(body): ValidatedJson<StatusRequest>,
) -> ApiResult<Order> {
    let shipment = ShipmentDetails {
        tracking_number: body.tracking_number,
        estimated_delivery_date: body.estimated_delivery_date,
    };
    let outcome = sf.update_status(&caller, order_id, body.status, shipment).await;
    settle(sf.reconcile_order(&caller, order_id, outcome).await)
}

pub async fn update_payment(
    State(sf): AppState,
    Identity(caller): Identity,
    Path(order_id): Path<OrderId>,
    ValidatedJson(body): ValidatedJson<PaymentRequest>,
) -> ApiResult<Order> {
    let update = PaymentUpdate {
        status: body.status,
        payment_method: body.payment_method,
        transaction_id: body.transaction_id,
    };
    let outcome = sf.update_payment(&caller, order_id, update).await;
    settle(sf.reconcile_order(&caller, order_id, outcome).await)
}

pub async fn set_stock(
    State(sf): AppState,
    Identity(caller): Identity,
    Path(product_id): Path<ProductId>,
    ValidatedJson(body): ValidatedJson<StockRequest>,
) -> ApiResult<ProductSnapshot> {
    let outcome = sf.set_stock(&caller, product_id, body.stock, body.expected).await;
    settle(sf.reconcile_product(product_id, outcome).await)
}

pub async fn dashboard_stats(State(sf): AppState, Identity(caller): Identity) -> ApiResult<DashboardStats> {
    ok(sf.dashboard_stats(&caller).await?)
}
