use crate::auth::UserContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pictor_core::models::{ArtifactRecord, TransformRequest};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct TransformResponse {
    /// The derived image, possibly still a placeholder
    pub image: ArtifactRecord,
    /// Whether this request sent work to the workers
    pub dispatched: bool,
}

/// Request a derived image. Identical requests share one record and one
/// dispatch.
#[utoipa::path(
    post,
    path = "/api/v1/images/{id}/transform",
    tag = "transformations",
    params(
        ("id" = String, Path, description = "Source image ID")
    ),
    request_body = TransformRequest,
    responses(
        (status = 200, description = "Derived image already available", body = TransformResponse),
        (status = 202, description = "Derived image is being produced", body = TransformResponse),
        (status = 400, description = "Invalid transformation spec", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Source image not found", body = ErrorResponse),
        (status = 503, description = "Store or dispatch unavailable", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, request),
    fields(user_id = %user.user_id, image_id = %id, operation = "transform_image")
)]
pub async fn transform_image(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    user: UserContext,
    ValidatedJson(request): ValidatedJson<TransformRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let admission = state
        .admission
        .request_transformation(&id, user.user_id, &request.transformations)
        .await?;

    let status = if admission.record.is_transformed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(TransformResponse {
            image: admission.record,
            dispatched: admission.dispatched,
        }),
    ))
}
