//! Shared application state
//!
//! Every collaborator is held behind its trait so the same router runs
//! against Postgres in production and in-memory stores in tests.

use std::sync::Arc;

use pictor_db::ArtifactStore;
use pictor_infra::FixedWindowRateLimiter;

use crate::auth::JwtService;
use crate::services::{JobAdmission, SignedUrlCache, UploadService};

#[derive(Clone)]
pub struct AppState {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub uploads: UploadService,
    pub admission: JobAdmission,
    pub url_cache: SignedUrlCache,
    pub security: SecurityState,
}

/// Authentication and throttling collaborators
#[derive(Clone)]
pub struct SecurityState {
    pub jwt: Arc<JwtService>,
    pub rate_limiter: Arc<FixedWindowRateLimiter>,
    /// Trailing `X-Forwarded-For` hops added by our own proxies
    pub trusted_proxy_count: usize,
}
