//! JSON-over-HTTP transport for the storefront core.
//!
//! Every mutation answers with the authoritative object, or with the error and
//! the current object so the client can drop its optimistic view.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::Storefront;

mod error;
mod handlers;
mod identity;

pub use error::{status_for, ApiError};
pub use handlers::{Data, ValidatedJson};
pub use identity::{Identity, USER_ID_HEADER, USER_ROLE_HEADER};

pub fn router(storefront: Arc<Storefront>) -> Router {
    let admin = Router::new()
        .route("/orders", get(handlers::admin_list_orders))
        .route("/orders/:id/status", post(handlers::update_status))
        .route("/orders/:id/payment", post(handlers::update_payment))
        .route("/products/:id/stock", post(handlers::set_stock))
        .route("/stats", get(handlers::dashboard_stats));

    let api = Router::new()
        .route("/cart", get(handlers::get_cart))
        .route("/cart/items", post(handlers::add_item))
        .route("/cart/items/:product_id", put(handlers::update_item).delete(handlers::remove_item))
        .route("/checkout", post(handlers::checkout))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/:id", get(handlers::get_order))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(storefront)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use testresult::TestResult;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::value_objects::UserId;
    use crate::services::test_support::{fixture, product};

    async fn call(app: &Router, method: Method, uri: &str, user: Option<(UserId, bool)>, body: Option<Value>) -> TestResult<(StatusCode, Value)> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some((user_id, admin)) = user {
            request = request.header(USER_ID_HEADER, user_id.to_string());
            if admin { request = request.header(USER_ROLE_HEADER, "admin"); }
        }
        let request = match body {
            Some(body) => request.header("content-type", "application/json").body(Body::from(body.to_string()))?,
            None => request.body(Body::empty())?,
        };
        let response = app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, value))
    }

    #[tokio::test]
    async fn health_needs_no_identity() -> TestResult {
        let app = router(Arc::new(fixture(vec![]).storefront));
        let (status, body) = call(&app, Method::GET, "/health", None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        Ok(())
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() -> TestResult {
        let app = router(Arc::new(fixture(vec![]).storefront));
        let (status, body) = call(&app, Method::GET, "/api/v1/cart", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["kind"], "unauthorized");
        Ok(())
    }

    #[tokio::test]
    async fn add_item_returns_authoritative_cart() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let app = router(Arc::new(fixture(vec![p1.clone()]).storefront));
        let user = Some((UserId::new(), false));
        let (status, body) = call(&app, Method::POST, "/api/v1/cart/items", user, Some(json!({ "product_id": p1.id, "quantity": 2 }))).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_items"], 2);
        assert_eq!(body["data"]["total_price"], "19.98");
        assert_eq!(body["data"]["items"][0]["subtotal"], "19.98");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_update_carries_current_cart() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let app = router(Arc::new(fixture(vec![p1.clone()]).storefront));
        let user = Some((UserId::new(), false));
        call(&app, Method::POST, "/api/v1/cart/items", user, Some(json!({ "product_id": p1.id, "quantity": 2 }))).await?;

        let uri = format!("/api/v1/cart/items/{}", p1.id);
        let (status, body) = call(&app, Method::PUT, &uri, user, Some(json!({ "quantity": 10 }))).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "insufficient_stock");
        assert_eq!(body["error"]["max_available"], 5);
        assert_eq!(body["current"]["items"][0]["quantity"], 2);

        let (status, body) = call(&app, Method::PUT, &uri, user, Some(json!({ "quantity": 0 }))).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_quantity");
        Ok(())
    }

    #[tokio::test]
    async fn fractional_quantities_are_invalid_quantity() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let app = router(Arc::new(fixture(vec![p1.clone()]).storefront));
        let shopper = Some((UserId::new(), false));
        let admin = Some((UserId::new(), true));

        let (status, body) = call(&app, Method::POST, "/api/v1/cart/items", shopper, Some(json!({ "product_id": p1.id, "quantity": 2.5 }))).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_quantity");

        let uri = format!("/api/v1/admin/products/{}/stock", p1.id);
        let (status, body) = call(&app, Method::POST, &uri, admin, Some(json!({ "stock": 4, "expected": 5.5 }))).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_quantity");

        let (status, body) = call(&app, Method::GET, "/api/v1/cart", shopper, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["items"].as_array().ok_or("items missing")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn checkout_then_admin_fulfilment() -> TestResult {
        let p1 = product("Mug", 999, 5);
        let app = router(Arc::new(fixture(vec![p1.clone()]).storefront));
        let shopper = Some((UserId::new(), false));
        let admin = Some((UserId::new(), true));
        call(&app, Method::POST, "/api/v1/cart/items", shopper, Some(json!({ "product_id": p1.id }))).await?;

        let shipping = json!({ "shipping_address": "1 Main St", "city": "Springfield", "postal_code": "12345", "country": "US" });
        let (status, body) = call(&app, Method::POST, "/api/v1/checkout", shopper, Some(shipping)).await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "pending");
        let order_id = body["data"]["id"].as_str().ok_or("order id missing")?.to_string();

        let status_uri = format!("/api/v1/admin/orders/{order_id}/status");
        let (status, _) = call(&app, Method::POST, &status_uri, shopper, Some(json!({ "status": "processing" }))).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, Method::POST, &status_uri, admin, Some(json!({ "status": "shipped" }))).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "invalid_transition");
        assert_eq!(body["current"]["status"], "pending");

        let (status, body) = call(&app, Method::POST, &status_uri, admin, Some(json!({ "status": "processing" }))).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "processing");

        let (status, body) = call(&app, Method::GET, "/api/v1/admin/stats", admin, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_orders"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn checkout_rejects_blank_shipping_fields() -> TestResult {
        let app = router(Arc::new(fixture(vec![]).storefront));
        let shipping = json!({ "shipping_address": "", "city": "Springfield", "postal_code": "12345", "country": "US" });
        let (status, body) = call(&app, Method::POST, "/api/v1/checkout", Some((UserId::new(), false)), Some(shipping)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_request");
        Ok(())
    }
}
