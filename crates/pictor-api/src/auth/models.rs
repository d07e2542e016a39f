use crate::error::ErrorResponse;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid, // user_id
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated caller, stored in request extensions by the auth middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Uuid,
}

// Extracted from parts rather than via `Extension` so it composes with Multipart.
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<UserContext>().copied().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Missing user context".to_string(),
                    details: None,
                    error_type: None,
                    code: "MISSING_USER_CONTEXT".to_string(),
                    recoverable: false,
                    suggested_action: Some("Provide a valid bearer token".to_string()),
                }),
            )
        })
    }
}
