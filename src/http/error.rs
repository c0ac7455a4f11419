//! Error envelope: `{ "error": { kind, message, .. }, "current": .. }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::reconcile::Rejection;
use crate::StorefrontError;

#[derive(Debug)]
pub enum ApiError {
    /// No usable identity on the request.
    Unauthorized(String),
    /// Malformed body or query that never reached the core.
    BadRequest(String),
    Core { error: StorefrontError, current: Option<Value> },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core { error, .. } => status_for(error),
        }
    }
}

pub fn status_for(error: &StorefrontError) -> StatusCode {
    use StorefrontError::*;
    match error {
        InvalidQuantity | EmptyCart => StatusCode::BAD_REQUEST,
        Forbidden => StatusCode::FORBIDDEN,
        ProductNotFound { .. } | ItemNotFound { .. } | OrderNotFound { .. } => StatusCode::NOT_FOUND,
        OutOfStock { .. }
        | InsufficientStock { .. }
        | StockChanged { .. }
        | InvalidTransition { .. }
        | StockConflict { .. }
        | Conflict => StatusCode::CONFLICT,
        Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Kind, message and the variant's structured fields.
fn describe(error: &StorefrontError) -> Value {
    use StorefrontError::*;
    let mut body = json!({ "kind": error.kind(), "message": error.to_string() });
    let details = match error {
        OutOfStock { product_id } | ProductNotFound { product_id } | ItemNotFound { product_id } => {
            json!({ "product_id": product_id })
        }
        InsufficientStock { product_id, requested, max_available } => {
            json!({ "product_id": product_id, "requested": requested, "max_available": max_available })
        }
        OrderNotFound { order_id } => json!({ "order_id": order_id }),
        StockChanged { lines } => json!({ "lines": lines }),
        InvalidTransition { from, to } => json!({ "from": from, "to": to }),
        StockConflict { product_id, current } => json!({ "product_id": product_id, "current_stock": current }),
        Storage(_) => {
            body["message"] = Value::from("internal storage error");
            Value::Null
        }
        InvalidQuantity | EmptyCart | Forbidden | Conflict => Value::Null,
    };
    if let (Some(body), Value::Object(details)) = (body.as_object_mut(), details) {
        body.extend(details);
    }
    body
}

impl From<StorefrontError> for ApiError {
    fn from(error: StorefrontError) -> Self { Self::Core { error, current: None } }
}

impl<C: Serialize> From<Rejection<C>> for ApiError {
    fn from(rejection: Rejection<C>) -> Self {
        let (error, current) = rejection.into_parts();
        let current = current.and_then(|state| serde_json::to_value(state).ok());
        Self::Core { error, current }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Unauthorized(message) => json!({ "error": { "kind": "unauthorized", "message": message }, "current": null }),
            Self::BadRequest(message) => json!({ "error": { "kind": "invalid_request", "message": message }, "current": null }),
            Self::Core { error, current } => {
                if let StorefrontError::Storage(source) = &error {
                    error!(error = %source, "storage failure");
                }
                json!({ "error": describe(&error), "current": current })
            }
        };
        (status, Json(body)).into_response()
    }
}
