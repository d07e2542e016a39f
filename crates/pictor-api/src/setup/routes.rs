//! Route configuration and setup

use crate::auth::auth_middleware;
use crate::constants::{API_PREFIX, HTTP_CONCURRENCY_LIMIT, OPENAPI_JSON_PATH};
use crate::handlers;
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use pictor_core::Config;
use pictor_infra::request_id_middleware;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Room for multipart framing on top of the largest accepted file, so an
/// oversized file is rejected by the upload policy with a JSON error.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Router-level settings
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub cors_origins: Vec<String>,
    pub max_file_size: usize,
}

impl From<&Config> for RouterSettings {
    fn from(config: &Config) -> Self {
        Self {
            cors_origins: config.cors_origins().to_vec(),
            max_file_size: config.max_file_size_bytes(),
        }
    }
}

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    Ok(build_router(state, &RouterSettings::from(config)))
}

/// Build the router. Layers, outermost first: request id, trace, CORS, body
/// and concurrency limits, then on the API routes only rate limiting and
/// authentication.
pub fn build_router(state: Arc<AppState>, settings: &RouterSettings) -> Router {
    let api_routes = image_routes(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.security.jwt.clone(),
            auth_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.security.clone(),
            rate_limit_middleware,
        ));

    public_routes()
        .nest(API_PREFIX, api_routes)
        .layer(DefaultBodyLimit::disable())
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(RequestBodyLimitLayer::new(
            settings.max_file_size + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(setup_cors(&settings.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
}

/// Setup CORS configuration
fn setup_cors(cors_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    if cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    }
}

/// Public routes (no authentication, no rate limiting)
fn public_routes() -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            OPENAPI_JSON_PATH,
            get(|| async { Json(crate::api_doc::ApiDoc::openapi()) }),
        )
        .merge(utoipa_rapidoc::RapiDoc::new(OPENAPI_JSON_PATH).path("/docs"))
}

/// Image routes, relative to [`API_PREFIX`]
fn image_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/images",
            post(handlers::images::upload_image).get(handlers::images::list_images),
        )
        .route("/images/{id}", get(handlers::images::get_image))
        .route(
            "/images/{id}/transform",
            post(handlers::image_transform::transform_image),
        )
        .route(
            "/images/{id}/url",
            get(handlers::image_access::get_image_url),
        )
        .route(
            "/images/{id}/file",
            get(handlers::image_access::get_image_file),
        )
        .with_state(state)
}
