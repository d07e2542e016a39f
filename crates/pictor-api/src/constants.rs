//! API constants

/// Versioned prefix every resource route is nested under
pub const API_PREFIX: &str = "/api/v1";

/// Where the OpenAPI document is served; RapiDoc at `/docs` reads it from here
pub const OPENAPI_JSON_PATH: &str = "/api/openapi.json";

/// Default and maximum page sizes for listings
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Server-wide cap on requests in flight
pub const HTTP_CONCURRENCY_LIMIT: usize = 10_000;
