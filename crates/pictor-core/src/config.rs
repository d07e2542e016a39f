//! Configuration module
//!
//! Settings are read once from the environment (and an optional `.env` file)
//! at startup, then validated before anything connects.

use std::env;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_REQUESTS: u32 = 10;
const RATE_LIMIT_WINDOW_SECS: u64 = 60;
const SIGNED_URL_EXPIRY_SECS: u64 = 3600;
const IMAGE_URL_CACHE_SECONDS: u64 = 3300;

/// Server, database and security settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub trusted_proxy_count: usize,
    pub environment: String,
}

/// Fixed-window rate limiting settings
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_secs: u64,
}

/// Image service configuration
#[derive(Clone, Debug)]
pub struct PictorConfig {
    pub base: BaseConfig,
    pub database_url: String,
    pub rate_limit: RateLimitConfig,
    // Storage configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Access URLs
    pub signed_url_expiry_secs: u64,
    pub image_url_cache_seconds: u64,
    // Uploads
    pub max_file_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    // Background work
    pub kv_purge_interval_secs: u64,
    pub job_max_attempts: i32,
    pub worker_max_concurrency: usize,
    pub worker_poll_interval_ms: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<PictorConfig>);

impl Config {
    fn inner(&self) -> &PictorConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_env(&self.inner().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = PictorConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn trusted_proxy_count(&self) -> usize {
        self.inner().base.trusted_proxy_count
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn rate_limit_requests(&self) -> u32 {
        self.inner().rate_limit.requests
    }

    pub fn rate_limit_window_secs(&self) -> u64 {
        self.inner().rate_limit.window_secs
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.inner().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn signed_url_expiry_secs(&self) -> u64 {
        self.inner().signed_url_expiry_secs
    }

    pub fn image_url_cache_seconds(&self) -> u64 {
        self.inner().image_url_cache_seconds
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.inner().max_file_size_bytes
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.inner().allowed_extensions
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.inner().allowed_content_types
    }

    pub fn kv_purge_interval_secs(&self) -> u64 {
        self.inner().kv_purge_interval_secs
    }

    pub fn job_max_attempts(&self) -> i32 {
        self.inner().job_max_attempts
    }

    pub fn worker_max_concurrency(&self) -> usize {
        self.inner().worker_max_concurrency
    }

    pub fn worker_poll_interval_ms(&self) -> u64 {
        self.inner().worker_poll_interval_ms
    }
}

fn is_production_env(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PictorConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const SERVER_PORT: u16 = 3000;
        const MAX_FILE_SIZE_MB: usize = 10;
        const TRUSTED_PROXY_COUNT: usize = 1;
        const KV_PURGE_INTERVAL_SECS: u64 = 300;
        const JOB_MAX_ATTEMPTS: i32 = 3;
        const WORKER_MAX_CONCURRENCY: usize = 4;
        const WORKER_POLL_INTERVAL_MS: u64 = 1000;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        if is_production_env(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let base = BaseConfig {
            server_port: env::var("SERVER_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            trusted_proxy_count: env::var("TRUSTED_PROXY_COUNT")
                .unwrap_or_else(|_| TRUSTED_PROXY_COUNT.to_string())
                .parse()
                .unwrap_or(TRUSTED_PROXY_COUNT),
            environment,
        };

        let rate_limit = RateLimitConfig {
            requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| RATE_LIMIT_REQUESTS.to_string())
                .parse()
                .unwrap_or(RATE_LIMIT_REQUESTS),
            window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| RATE_LIMIT_WINDOW_SECS.to_string())
                .parse()
                .unwrap_or(RATE_LIMIT_WINDOW_SECS),
        };

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .and_then(|s| s.parse::<StorageBackend>().ok());

        Ok(PictorConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            rate_limit,
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .ok()
                .or_else(|| Some("./data/media".to_string())),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL")
                .ok()
                .or_else(|| Some("http://localhost:3000/media".to_string())),
            signed_url_expiry_secs: env::var("SIGNED_URL_EXPIRY_SECS")
                .unwrap_or_else(|_| SIGNED_URL_EXPIRY_SECS.to_string())
                .parse()
                .unwrap_or(SIGNED_URL_EXPIRY_SECS),
            image_url_cache_seconds: env::var("IMAGE_URL_CACHE_SECONDS")
                .unwrap_or_else(|_| IMAGE_URL_CACHE_SECONDS.to_string())
                .parse()
                .unwrap_or(IMAGE_URL_CACHE_SECONDS),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            allowed_extensions: split_list(
                &env::var("ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| "jpg,jpeg,png,gif,webp".to_string()),
            ),
            allowed_content_types: split_list(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| "image/jpeg,image/png,image/gif,image/webp".to_string()),
            ),
            kv_purge_interval_secs: env::var("KV_PURGE_INTERVAL_SECS")
                .unwrap_or_else(|_| KV_PURGE_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(KV_PURGE_INTERVAL_SECS),
            job_max_attempts: env::var("JOB_MAX_ATTEMPTS")
                .unwrap_or_else(|_| JOB_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(JOB_MAX_ATTEMPTS),
            worker_max_concurrency: env::var("WORKER_MAX_CONCURRENCY")
                .unwrap_or_else(|_| WORKER_MAX_CONCURRENCY.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_CONCURRENCY),
            worker_poll_interval_ms: env::var("WORKER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| WORKER_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(WORKER_POLL_INTERVAL_MS),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.rate_limit.requests == 0 {
            return Err(anyhow::anyhow!("RATE_LIMIT_REQUESTS must be greater than 0"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(anyhow::anyhow!(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0"
            ));
        }

        // A cached URL must never outlive the URL itself.
        if self.image_url_cache_seconds == 0
            || self.image_url_cache_seconds >= self.signed_url_expiry_secs
        {
            return Err(anyhow::anyhow!(
                "IMAGE_URL_CACHE_SECONDS ({}) must be greater than 0 and less than SIGNED_URL_EXPIRY_SECS ({})",
                self.image_url_cache_seconds,
                self.signed_url_expiry_secs
            ));
        }

        if self.job_max_attempts < 1 {
            return Err(anyhow::anyhow!("JOB_MAX_ATTEMPTS must be at least 1"));
        }

        let backend = self.storage_backend.unwrap_or(StorageBackend::Local);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PictorConfig {
        PictorConfig {
            base: BaseConfig {
                server_port: 3000,
                cors_origins: vec!["*".to_string()],
                db_max_connections: MAX_CONNECTIONS,
                db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
                jwt_secret: "a".repeat(32),
                trusted_proxy_count: 1,
                environment: "development".to_string(),
            },
            database_url: "postgresql://localhost/pictor".to_string(),
            rate_limit: RateLimitConfig {
                requests: RATE_LIMIT_REQUESTS,
                window_secs: RATE_LIMIT_WINDOW_SECS,
            },
            storage_backend: Some(StorageBackend::Local),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: Some("/tmp/pictor".to_string()),
            local_storage_base_url: Some("http://localhost:3000/media".to_string()),
            signed_url_expiry_secs: SIGNED_URL_EXPIRY_SECS,
            image_url_cache_seconds: IMAGE_URL_CACHE_SECONDS,
            max_file_size_bytes: 10 * 1024 * 1024,
            allowed_extensions: vec!["png".to_string()],
            allowed_content_types: vec!["image/png".to_string()],
            kv_purge_interval_secs: 300,
            job_max_attempts: 3,
            worker_max_concurrency: 4,
            worker_poll_interval_ms: 1000,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_jwt_secret() {
        let mut config = sample();
        config.base.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_cache_ttl_not_below_url_lifetime() {
        let mut config = sample();
        config.image_url_cache_seconds = config.signed_url_expiry_secs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("IMAGE_URL_CACHE_SECONDS"));
    }

    #[test]
    fn test_validate_requires_bucket_for_s3() {
        let mut config = sample();
        config.storage_backend = Some(StorageBackend::S3);
        config.aws_region = Some("us-east-1".to_string());
        assert!(config.validate().is_err());
        config.s3_bucket = Some("images".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_production() {
        let mut config = sample();
        config.base.environment = "Prod".to_string();
        assert!(Config(Box::new(config)).is_production());
    }
}
