use std::sync::Arc;
use std::time::Duration;

use pictor_core::constants::IMAGE_URL_CACHE_PREFIX;
use pictor_core::AppError;
use pictor_db::{ArtifactStore, KeyValueStore};
use pictor_storage::Storage;
use uuid::Uuid;

/// Signed access URLs, cached in the shared key-value store.
///
/// The cache only saves URL generation. Ownership is always checked against
/// the artifact store, and every cache failure degrades to generating a
/// fresh URL. The cache TTL must stay below the URL lifetime so a cached URL
/// is never served expired.
#[derive(Clone)]
pub struct SignedUrlCache {
    kv: Arc<dyn KeyValueStore>,
    storage: Arc<dyn Storage>,
    artifacts: Arc<dyn ArtifactStore>,
    cache_ttl: Duration,
    url_expiry: Duration,
}

impl SignedUrlCache {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        storage: Arc<dyn Storage>,
        artifacts: Arc<dyn ArtifactStore>,
        cache_ttl: Duration,
        url_expiry: Duration,
    ) -> Self {
        Self {
            kv,
            storage,
            artifacts,
            cache_ttl,
            url_expiry,
        }
    }

    fn cache_key(artifact_id: &str) -> String {
        format!("{}{}", IMAGE_URL_CACHE_PREFIX, artifact_id)
    }

    #[tracing::instrument(skip(self), fields(artifact_id = %artifact_id, owner_id = %owner_id))]
    pub async fn get_url(&self, artifact_id: &str, owner_id: Uuid) -> Result<String, AppError> {
        let record = self
            .artifacts
            .get_owned(artifact_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;

        let key = Self::cache_key(artifact_id);

        match self.kv.get(&key).await {
            Ok(Some(url)) => {
                tracing::debug!("Signed URL cache hit");
                return Ok(url);
            }
            Ok(None) => tracing::debug!("Signed URL cache miss"),
            Err(e) => tracing::warn!(error = %e, "URL cache unavailable, generating directly"),
        }

        let url = self
            .storage
            .get_presigned_url(&record.storage_url, self.url_expiry)
            .await
            .map_err(|e| {
                AppError::UpstreamGeneration(format!(
                    "Failed to sign URL for {}: {}",
                    artifact_id, e
                ))
            })?;

        // An in-flight placeholder still points at its source blob; caching
        // that would keep serving the source after the worker finishes.
        if record.is_in_flight() {
            return Ok(url);
        }

        if let Err(e) = self.kv.set_with_ttl(&key, &url, self.cache_ttl).await {
            tracing::warn!(error = %e, "Failed to cache signed URL");
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pictor_core::models::{DispatchState, NewArtifact};
    use pictor_db::{MemoryArtifactStore, MemoryKeyValueStore};
    use pictor_storage::MemoryStorage;

    struct Fixture {
        kv: MemoryKeyValueStore,
        storage: MemoryStorage,
        cache: SignedUrlCache,
        owner: Uuid,
    }

    async fn fixture() -> Fixture {
        let kv = MemoryKeyValueStore::new();
        let storage = MemoryStorage::new("https://cdn.example.com");
        let artifacts = MemoryArtifactStore::new();
        let owner = Uuid::new_v4();

        artifacts
            .create(NewArtifact {
                id: "img".to_string(),
                owner_id: owner,
                filename: "cat.png".to_string(),
                storage_url: format!("media/{}/cat.png", owner),
                mimetype: "image/png".to_string(),
                size_bytes: 10,
                metadata: serde_json::json!({}),
                source_id: None,
                dispatch_state: None,
            })
            .await
            .unwrap();
        artifacts
            .create(NewArtifact {
                id: "img_fp".to_string(),
                owner_id: owner,
                filename: "transformed_cat.png".to_string(),
                storage_url: format!("media/{}/cat.png", owner),
                mimetype: "image/png".to_string(),
                size_bytes: 0,
                metadata: serde_json::json!({ "rotate": 90 }),
                source_id: Some("img".to_string()),
                dispatch_state: Some(DispatchState::Dispatched),
            })
            .await
            .unwrap();

        let cache = SignedUrlCache::new(
            Arc::new(kv.clone()),
            Arc::new(storage.clone()),
            Arc::new(artifacts),
            Duration::from_secs(3300),
            Duration::from_secs(3600),
        );

        Fixture {
            kv,
            storage,
            cache,
            owner,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_is_served_from_cache() {
        let fx = fixture().await;

        let first = fx.cache.get_url("img", fx.owner).await.unwrap();
        tokio::time::advance(Duration::from_secs(3000)).await;
        let second = fx.cache.get_url("img", fx.owner).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.storage.presign_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_regenerated() {
        let fx = fixture().await;

        let first = fx.cache.get_url("img", fx.owner).await.unwrap();
        tokio::time::advance(Duration::from_secs(3301)).await;
        let second = fx.cache.get_url("img", fx.owner).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(fx.storage.presign_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_generation() {
        let fx = fixture().await;
        fx.kv.set_unavailable(true);

        let url = fx.cache.get_url("img", fx.owner).await.unwrap();
        assert!(url.starts_with("https://cdn.example.com/media/"));
        fx.cache.get_url("img", fx.owner).await.unwrap();
        assert_eq!(fx.storage.presign_calls(), 2);
    }

    #[tokio::test]
    async fn test_foreign_owner_is_not_found_even_when_cached() {
        let fx = fixture().await;
        fx.cache.get_url("img", fx.owner).await.unwrap();

        let err = fx.cache.get_url("img", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = fx.cache.get_url("missing", fx.owner).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_signing_failure_is_upstream_error() {
        let fx = fixture().await;
        fx.storage.set_failing(true);

        let err = fx.cache.get_url("img", fx.owner).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamGeneration(_)));
    }

    #[tokio::test]
    async fn test_in_flight_placeholder_urls_are_not_cached() {
        let fx = fixture().await;

        fx.cache.get_url("img_fp", fx.owner).await.unwrap();
        fx.cache.get_url("img_fp", fx.owner).await.unwrap();

        assert_eq!(fx.storage.presign_calls(), 2);
        assert_eq!(fx.kv.get("image_url:img_fp").await.unwrap(), None);
    }
}
