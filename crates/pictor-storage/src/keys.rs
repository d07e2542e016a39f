//! Shared key generation for storage backends.

use uuid::Uuid;

/// Storage key for a file owned by `owner_id`: `media/{owner_id}/{filename}`.
///
/// All backends must use this format so records stay portable between them.
pub fn generate_storage_key(owner_id: Uuid, filename: &str) -> String {
    format!("media/{}/{}", owner_id, filename)
}

/// Keys must stay relative and may not climb out of the storage root.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains("..") && !key.starts_with('/')
}
