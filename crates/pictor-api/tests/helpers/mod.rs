//! Test helpers: build the application router over in-memory backends.
//!
//! Run from workspace root: `cargo test -p pictor-api --test images_test`.
//! No database or Docker is needed; the stores, storage and dispatcher are
//! the in-memory implementations, held here so tests can inspect them.

pub mod auth;
pub mod dispatcher;
pub mod fixtures;

use axum_test::TestServer;
use pictor_api::constants;
use pictor_api::setup::routes::{build_router, RouterSettings};
use pictor_api::setup::services::{build_state, Backends, ServiceSettings};
use pictor_api::UploadPolicy;
use pictor_db::{MemoryArtifactStore, MemoryKeyValueStore};
use pictor_storage::MemoryStorage;
use std::sync::Arc;
use std::time::Duration;

use dispatcher::CountingDispatcher;

/// API path prefix for tests (e.g. `/api/v1`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server plus handles on every backend.
pub struct TestApp {
    pub server: TestServer,
    pub artifacts: MemoryArtifactStore,
    pub kv: MemoryKeyValueStore,
    pub storage: MemoryStorage,
    pub dispatcher: CountingDispatcher,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn test_settings(rate_limit_requests: u32) -> ServiceSettings {
    ServiceSettings {
        jwt_secret: auth::TEST_JWT_SECRET.to_string(),
        rate_limit_requests,
        rate_limit_window: Duration::from_secs(60),
        trusted_proxy_count: 1,
        url_cache_ttl: Duration::from_secs(3300),
        url_expiry: Duration::from_secs(3600),
        upload_policy: UploadPolicy {
            max_file_size: 1024 * 1024,
            allowed_extensions: vec!["jpg".into(), "jpeg".into(), "png".into(), "webp".into()],
            allowed_content_types: vec![
                "image/jpeg".into(),
                "image/png".into(),
                "image/webp".into(),
            ],
        },
    }
}

/// Setup a test app with a generous rate limit.
pub fn setup_test_app() -> TestApp {
    setup_test_app_with(test_settings(1000))
}

pub fn setup_test_app_with(settings: ServiceSettings) -> TestApp {
    let artifacts = MemoryArtifactStore::new();
    let kv = MemoryKeyValueStore::new();
    let storage = MemoryStorage::new("https://cdn.test");
    let dispatcher = CountingDispatcher::default();

    let state = build_state(
        &settings,
        Backends {
            artifacts: Arc::new(artifacts.clone()),
            kv: Arc::new(kv.clone()),
            storage: Arc::new(storage.clone()),
            dispatcher: Arc::new(dispatcher.clone()),
        },
    );
    let router = build_router(
        state,
        &RouterSettings {
            cors_origins: vec!["*".to_string()],
            max_file_size: settings.upload_policy.max_file_size,
        },
    );
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        artifacts,
        kv,
        storage,
        dispatcher,
    }
}
