use crate::auth::UserContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageUrlResponse {
    pub id: String,
    /// Time-limited URL granting read access to the image bytes
    pub url: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/images/{id}/url",
    tag = "images",
    params(
        ("id" = String, Path, description = "Image ID")
    ),
    responses(
        (status = 200, description = "Signed URL", body = ImageUrlResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Image not found", body = ErrorResponse),
        (status = 502, description = "URL signing failed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(user_id = %user.user_id, image_id = %id, operation = "get_image_url")
)]
pub async fn get_image_url(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    user: UserContext,
) -> Result<impl IntoResponse, HttpAppError> {
    let url = state.url_cache.get_url(&id, user.user_id).await?;
    Ok(Json(ImageUrlResponse { id, url }))
}

#[utoipa::path(
    get,
    path = "/api/v1/images/{id}/file",
    tag = "images",
    params(
        ("id" = String, Path, description = "Image ID")
    ),
    responses(
        (status = 307, description = "Redirect to the signed URL"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Image not found", body = ErrorResponse),
        (status = 502, description = "URL signing failed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(user_id = %user.user_id, image_id = %id, operation = "get_image_file")
)]
pub async fn get_image_file(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    user: UserContext,
) -> Result<impl IntoResponse, HttpAppError> {
    let url = state.url_cache.get_url(&id, user.user_id).await?;
    Ok(Redirect::temporary(&url))
}
