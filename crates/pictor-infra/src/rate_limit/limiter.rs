use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pictor_core::constants::RATE_LIMIT_KEY_PREFIX;
use pictor_db::KeyValueStore;

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests counted in the current window, this one included
    pub count: u64,
    pub remaining: u32,
    /// Seconds until the window resets; zero when admitted
    pub retry_after_secs: u64,
    /// Unix timestamp at which the current window ends
    pub reset_at: i64,
    /// True when the store could not be consulted and the request was let through
    pub degraded: bool,
}

/// Fixed-window limiter.
///
/// Each client has one counter in the shared store. The first increment of a
/// window arms its expiry; later increments leave it alone, so the window
/// restarts only once the key has expired. No state is kept in process, which
/// keeps the count exact across every instance sharing the store.
#[derive(Clone)]
pub struct FixedWindowRateLimiter {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
    window: Duration,
}

impl FixedWindowRateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    fn key(client_id: &str) -> String {
        format!("{}{}", RATE_LIMIT_KEY_PREFIX, client_id)
    }

    /// Count one request for `client_id` and decide whether it may proceed.
    ///
    /// Store failures admit the request.
    #[tracing::instrument(skip(self), fields(limit = self.limit))]
    pub async fn admit(&self, client_id: &str) -> RateLimitDecision {
        let key = Self::key(client_id);

        let count = match self.store.incr_with_expiry(&key, self.window).await {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    client_id = %client_id,
                    "Rate limit store unavailable, admitting request"
                );
                return self.fail_open();
            }
        };

        let secs_left = self.seconds_left(&key).await;
        let reset_at = Utc::now().timestamp() + secs_left as i64;
        let remaining = (self.limit as u64).saturating_sub(count) as u32;

        if count > self.limit as u64 {
            tracing::debug!(
                client_id = %client_id,
                count,
                retry_after_secs = secs_left,
                "Rate limit exceeded"
            );
            return RateLimitDecision {
                allowed: false,
                limit: self.limit,
                count,
                remaining: 0,
                retry_after_secs: secs_left,
                reset_at,
                degraded: false,
            };
        }

        tracing::trace!(client_id = %client_id, count, remaining, "Request admitted");
        RateLimitDecision {
            allowed: true,
            limit: self.limit,
            count,
            remaining,
            retry_after_secs: 0,
            reset_at,
            degraded: false,
        }
    }

    /// Whole seconds left in the window, rounded up and kept within
    /// `1..=window`. Falls back to the full window when the store cannot say.
    async fn seconds_left(&self, key: &str) -> u64 {
        let window_secs = self.window_secs();
        match self.store.ttl(key).await {
            Ok(Some(ttl)) => {
                let mut secs = ttl.as_secs();
                if ttl.subsec_nanos() > 0 {
                    secs += 1;
                }
                secs.clamp(1, window_secs)
            }
            Ok(None) => window_secs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read rate limit window ttl");
                window_secs
            }
        }
    }

    fn fail_open(&self) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: self.limit,
            count: 0,
            remaining: self.limit,
            retry_after_secs: 0,
            reset_at: Utc::now().timestamp() + self.window_secs() as i64,
            degraded: true,
        }
    }
}
