//! Caller identity, supplied by a trusted upstream in request headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::error::ApiError;
use crate::domain::value_objects::UserId;
use crate::services::Caller;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
const ADMIN_ROLE: &str = "admin";

/// Extracts the [`Caller`] for a request. Rejects with 401 when the user id
/// header is missing or is not a uuid.
#[derive(Clone, Copy, Debug)]
pub struct Identity(pub Caller);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(UserId::from_uuid)
            .ok_or_else(|| ApiError::Unauthorized(format!("{USER_ID_HEADER} must be a uuid")))?;
        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE));
        Ok(Identity(Caller { user_id, is_admin }))
    }
}
