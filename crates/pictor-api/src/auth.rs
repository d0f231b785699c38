//! Caller identity.
//!
//! Identity is established upstream; the trusted `x-user-id` header carries
//! the caller's UUID.

use axum::{extract::FromRequestParts, http::request::Parts, http::StatusCode, Json};
use uuid::Uuid;

use crate::error::ErrorResponse;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(CallerId)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "Missing or invalid caller identity".to_string(),
                        error_type: "Unauthenticated".to_string(),
                        code: "MISSING_CALLER_ID".to_string(),
                        recoverable: false,
                        suggested_action: Some(format!(
                            "Send the caller's UUID in the {} header",
                            USER_ID_HEADER
                        )),
                    }),
                )
            })
    }
}
