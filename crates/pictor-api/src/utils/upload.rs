//! Multipart helpers for the upload handler

use axum::extract::Multipart;
use pictor_core::AppError;

/// One file pulled out of a multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Read the single `file` field. Other fields are ignored; a second `file`
/// field is rejected.
pub async fn extract_multipart_file(mut multipart: Multipart) -> Result<UploadedFile, AppError> {
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if file.is_some() {
            return Err(AppError::InvalidInput(
                "Send exactly one field named 'file'".to_string(),
            ));
        }

        let filename = field.file_name().unwrap_or("unknown").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))?;

        file = Some(UploadedFile {
            data: data.to_vec(),
            filename,
            content_type,
        });
    }

    file.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))
}

/// Keep the last path component and replace anything outside
/// `[A-Za-z0-9._-]`. Only used for the `original_filename` metadata; the
/// stored name is always generated.
pub fn sanitize_filename(filename: &str) -> String {
    const MAX_FILENAME_LENGTH: usize = 255;

    let name = filename
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}
