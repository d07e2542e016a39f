//! Service initialization and application state setup

use crate::auth::JwtService;
use crate::services::{JobAdmission, SignedUrlCache, UploadPolicy, UploadService};
use crate::state::{AppState, SecurityState};
use anyhow::Result;
use pictor_core::Config;
use pictor_db::{ArtifactStore, JobRepository, KeyValueStore, PgArtifactStore, PgKeyValueStore};
use pictor_infra::{FixedWindowRateLimiter, KvPurgeTask};
use pictor_storage::Storage;
use pictor_worker::{QueueDispatcher, TransformationDispatcher};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// The stateful collaborators behind the HTTP services
#[derive(Clone)]
pub struct Backends {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Arc<dyn TransformationDispatcher>,
}

/// Tunables for the HTTP services, normally taken from [`Config`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub jwt_secret: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub trusted_proxy_count: usize,
    pub url_cache_ttl: Duration,
    pub url_expiry: Duration,
    pub upload_policy: UploadPolicy,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret().to_string(),
            rate_limit_requests: config.rate_limit_requests(),
            rate_limit_window: Duration::from_secs(config.rate_limit_window_secs()),
            trusted_proxy_count: config.trusted_proxy_count(),
            url_cache_ttl: Duration::from_secs(config.image_url_cache_seconds()),
            url_expiry: Duration::from_secs(config.signed_url_expiry_secs()),
            upload_policy: UploadPolicy::from(config),
        }
    }
}

/// Assemble the application state from explicit backends.
pub fn build_state(settings: &ServiceSettings, backends: Backends) -> Arc<AppState> {
    let Backends {
        artifacts,
        kv,
        storage,
        dispatcher,
    } = backends;

    let rate_limiter = FixedWindowRateLimiter::new(
        kv.clone(),
        settings.rate_limit_requests,
        settings.rate_limit_window,
    );

    Arc::new(AppState {
        uploads: UploadService::new(
            storage.clone(),
            artifacts.clone(),
            settings.upload_policy.clone(),
        ),
        admission: JobAdmission::new(artifacts.clone(), dispatcher),
        url_cache: SignedUrlCache::new(
            kv,
            storage,
            artifacts.clone(),
            settings.url_cache_ttl,
            settings.url_expiry,
        ),
        artifacts,
        security: SecurityState {
            jwt: Arc::new(JwtService::new(&settings.jwt_secret)),
            rate_limiter: Arc::new(rate_limiter),
            trusted_proxy_count: settings.trusted_proxy_count,
        },
    })
}

/// Wire the Postgres-backed stores and queue dispatcher, and start the
/// expired key purge.
pub fn initialize_services(
    config: &Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let kv_store = PgKeyValueStore::new(pool.clone());

    let purge_every = config.kv_purge_interval_secs();
    if purge_every > 0 {
        Arc::new(KvPurgeTask::new(
            kv_store.clone(),
            Duration::from_secs(purge_every),
        ))
        .start();
        tracing::info!(interval_secs = purge_every, "KV purge task started");
    } else {
        tracing::info!("KV purge task disabled");
    }

    let backends = Backends {
        artifacts: Arc::new(PgArtifactStore::new(pool.clone())),
        kv: Arc::new(kv_store),
        storage,
        dispatcher: Arc::new(QueueDispatcher::new(
            JobRepository::new(pool),
            config.job_max_attempts(),
        )),
    };

    let state = build_state(&ServiceSettings::from(config), backends);
    tracing::info!(
        rate_limit_requests = config.rate_limit_requests(),
        rate_limit_window_secs = config.rate_limit_window_secs(),
        url_cache_seconds = config.image_url_cache_seconds(),
        "Services initialized"
    );

    Ok(state)
}
