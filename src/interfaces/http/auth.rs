//! Caller identity for handlers.
//!
//! Tokens are verified by the gateway in front of this service, which
//! forwards the authenticated user id in the `x-user-id` header.

use crate::domain::user::UserId;
use crate::error::MarketError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| MarketError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?;
        let user_id = raw
            .trim()
            .parse()
            .map_err(|_| MarketError::Unauthorized(format!("Invalid {USER_ID_HEADER} header")))?;
        Ok(AuthUser { user_id })
    }
}
