/// Cache key prefix for signed access URLs
pub const IMAGE_URL_CACHE_PREFIX: &str = "image_url:";

/// Key prefix for rate-limit windows
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

/// Postgres NOTIFY channel the dispatcher signals on
pub const TRANSFORMATION_NOTIFY_CHANNEL: &str = "pictor_transformation_jobs";
