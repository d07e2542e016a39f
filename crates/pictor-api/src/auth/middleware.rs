use crate::auth::jwt::JwtService;
use crate::auth::models::UserContext;
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pictor_core::AppError;
use std::sync::Arc;

/// The token of an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject requests without a valid bearer token; otherwise attach a
/// [`UserContext`] for handlers.
pub async fn auth_middleware(
    State(jwt): State<Arc<JwtService>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.headers().get(AUTHORIZATION).is_none() {
        return HttpAppError(AppError::Unauthorized(
            "Missing authorization header".to_string(),
        ))
        .into_response();
    }

    let Some(token) = bearer_token(request.headers()) else {
        return HttpAppError(AppError::Unauthorized(
            "Invalid authorization header format".to_string(),
        ))
        .into_response();
    };

    match jwt.validate_token(token) {
        Ok(claims) => {
            tracing::trace!(user_id = %claims.sub, "Request authenticated");
            request.extensions_mut().insert(UserContext {
                user_id: claims.sub,
            });
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}
