//! OpenAPI documentation, served at `/api/openapi.json` and browsable at `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use pictor_core::models;

/// Registers the bearer JWT scheme referenced by `security(("bearer_auth" = []))`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pictor API",
        version = "0.1.0",
        description = "Image upload and transformation API. Identical transformation requests share one derived image and one unit of worker dispatch. All endpoints are versioned under /api/v1/."
    ),
    paths(
        handlers::health::health_check,
        handlers::images::upload_image,
        handlers::images::list_images,
        handlers::images::get_image,
        handlers::image_transform::transform_image,
        handlers::image_access::get_image_url,
        handlers::image_access::get_image_file,
    ),
    components(
        schemas(
            models::ArtifactRecord,
            models::ArtifactPage,
            models::DispatchState,
            models::TransformationSpec,
            models::Resize,
            models::Crop,
            models::TransformRequest,
            handlers::health::HealthResponse,
            handlers::images::ListImagesQuery,
            handlers::image_transform::TransformResponse,
            handlers::image_access::ImageUrlResponse,
            error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "images", description = "Image upload, listing and access URLs"),
        (name = "transformations", description = "Deduplicated transformation requests"),
        (name = "health", description = "Service liveness")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_versioned_paths_and_bearer_scheme() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/api/v1/images/{id}/transform"));
        assert!(spec.paths.paths.contains_key("/health"));
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
