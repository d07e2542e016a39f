use crate::auth::UserContext;
use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use crate::utils::upload::extract_multipart_file;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pictor_core::models::{ArtifactPage, ArtifactRecord};
use pictor_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[utoipa::path(
    post,
    path = "/api/v1/images",
    tag = "images",
    request_body(content = inline(Object), content_type = "multipart/form-data", description = "Image file in the `file` field"),
    responses(
        (status = 201, description = "Image uploaded", body = ArtifactRecord),
        (status = 400, description = "Invalid file", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, multipart),
    fields(user_id = %user.user_id, operation = "upload_image")
)]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let file = extract_multipart_file(multipart).await?;
    let record = state.uploads.upload(user.user_id, file).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize, ToSchema, IntoParams, Validate)]
pub struct ListImagesQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

#[utoipa::path(
    get,
    path = "/api/v1/images",
    tag = "images",
    params(ListImagesQuery),
    responses(
        (status = 200, description = "Caller's images, newest first", body = ArtifactPage),
        (status = 400, description = "Invalid pagination", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, query),
    fields(
        user_id = %user.user_id,
        page = query.page,
        limit = query.limit,
        operation = "list_images"
    )
)]
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Query(query): Query<ListImagesQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    query.validate().map_err(|e| {
        AppError::InvalidInput(format!(
            "page must be >= 1 and limit between 1 and {}: {}",
            MAX_PAGE_LIMIT, e
        ))
    })?;

    let page = state
        .artifacts
        .list_by_owner(user.user_id, query.page, query.limit)
        .await?;

    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/images/{id}",
    tag = "images",
    params(
        ("id" = String, Path, description = "Image ID")
    ),
    responses(
        (status = 200, description = "Image found", body = ArtifactRecord),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Image not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(user_id = %user.user_id, image_id = %id, operation = "get_image")
)]
pub async fn get_image(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    user: UserContext,
) -> Result<impl IntoResponse, HttpAppError> {
    let record = state
        .artifacts
        .get_owned(&id, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

    Ok(Json(record))
}
