use std::sync::Arc;

use pictor_core::models::{ArtifactRecord, NewArtifact};
use pictor_core::{AppError, Config};
use pictor_db::ArtifactStore;
use pictor_storage::Storage;
use uuid::Uuid;

use crate::error::from_storage_error;
use crate::utils::upload::{sanitize_filename, UploadedFile};

/// Limits an uploaded source image must satisfy
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

impl From<&Config> for UploadPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_file_size: config.max_file_size_bytes(),
            allowed_extensions: config.allowed_extensions().to_vec(),
            allowed_content_types: config.allowed_content_types().to_vec(),
        }
    }
}

impl UploadPolicy {
    /// Check size, extension and declared content type. Returns the
    /// lowercased extension and the content type without parameters.
    pub fn validate(&self, file: &UploadedFile) -> Result<(String, String), AppError> {
        if file.data.is_empty() {
            return Err(AppError::InvalidInput("File is empty".to_string()));
        }
        if file.data.len() > self.max_file_size {
            return Err(AppError::PayloadTooLarge(format!(
                "{} bytes exceeds the maximum of {} bytes",
                file.data.len(),
                self.max_file_size
            )));
        }

        let extension = file
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Missing file extension (filename: {})",
                    file.filename
                ))
            })?;
        if !self.allowed_extensions.contains(&extension) {
            return Err(AppError::InvalidInput(format!(
                "Invalid file extension '{}'. Allowed: {}",
                extension,
                self.allowed_extensions.join(", ")
            )));
        }

        // Parameters such as `; charset=` must not widen the allowlist.
        let content_type = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if !self
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
        {
            return Err(AppError::InvalidInput(format!(
                "Invalid content type '{}'. Allowed: {}",
                content_type,
                self.allowed_content_types.join(", ")
            )));
        }

        Ok((extension, content_type))
    }
}

/// Stores uploaded source images and records them.
#[derive(Clone)]
pub struct UploadService {
    storage: Arc<dyn Storage>,
    artifacts: Arc<dyn ArtifactStore>,
    policy: UploadPolicy,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn Storage>,
        artifacts: Arc<dyn ArtifactStore>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            storage,
            artifacts,
            policy,
        }
    }

    #[tracing::instrument(skip(self, file), fields(owner_id = %owner_id, size_bytes = file.data.len()))]
    pub async fn upload(
        &self,
        owner_id: Uuid,
        file: UploadedFile,
    ) -> Result<ArtifactRecord, AppError> {
        let (extension, content_type) = self.policy.validate(&file)?;

        let id = Uuid::new_v4();
        let stored_filename = format!("{}.{}", id, extension);
        let original_filename = sanitize_filename(&file.filename);
        let size_bytes = file.data.len() as i64;

        let (storage_key, _url) = self
            .storage
            .upload(owner_id, &stored_filename, &content_type, file.data)
            .await
            .map_err(from_storage_error)?;

        let created = self
            .artifacts
            .create(NewArtifact {
                id: id.to_string(),
                owner_id,
                filename: stored_filename,
                storage_url: storage_key.clone(),
                mimetype: content_type,
                size_bytes,
                metadata: serde_json::json!({ "original_filename": original_filename }),
                source_id: None,
                dispatch_state: None,
            })
            .await;

        match created {
            Ok(record) => {
                tracing::info!(artifact_id = %record.id, storage_key = %storage_key, "Image uploaded");
                Ok(record)
            }
            Err(e) => {
                let storage = self.storage.clone();
                tokio::spawn(async move {
                    if let Err(cleanup_err) = storage.delete(&storage_key).await {
                        tracing::warn!(
                            error = %cleanup_err,
                            storage_key = %storage_key,
                            "Failed to clean up blob after record insert failed"
                        );
                    }
                });
                Err(e)
            }
        }
    }
}
