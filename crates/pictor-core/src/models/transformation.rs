//! Transformation request models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Output formats a transformation may request
pub const SUPPORTED_OUTPUT_FORMATS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp", "avif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct Resize {
    #[validate(range(min = 1, max = 10000))]
    pub width: u32,
    #[validate(range(min = 1, max = 10000))]
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    #[validate(range(min = 1, max = 10000))]
    pub width: u32,
    #[validate(range(min = 1, max = 10000))]
    pub height: u32,
}

/// Requested operations for one derived image.
///
/// Every field is optional; only present fields take part in fingerprinting,
/// so two specs that set the same fields to the same values are the same
/// request no matter how they were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct TransformationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub resize: Option<Resize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub crop: Option<Crop>,
    /// Rotation in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = -360, max = 360))]
    pub rotate: Option<i32>,
    /// Watermark text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 256))]
    pub watermark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 100))]
    pub compress_quality: Option<u8>,
    /// Output format (jpeg, png, gif, webp, avif)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Named filters toggled on or off (e.g. grayscale, sepia)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, bool>>,
}

impl TransformationSpec {
    /// Present fields in canonical order with normalized values.
    ///
    /// The order here is fixed and never depends on how the spec was parsed.
    /// An empty filter map counts as absent.
    pub fn present_fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = Vec::new();
        if let Some(resize) = &self.resize {
            fields.push((
                "resize",
                serde_json::json!({ "width": resize.width, "height": resize.height }),
            ));
        }
        if let Some(crop) = &self.crop {
            fields.push((
                "crop",
                serde_json::json!({
                    "x": crop.x,
                    "y": crop.y,
                    "width": crop.width,
                    "height": crop.height,
                }),
            ));
        }
        if let Some(rotate) = self.rotate {
            fields.push(("rotate", Value::from(rotate)));
        }
        if let Some(watermark) = &self.watermark {
            fields.push(("watermark", Value::from(watermark.as_str())));
        }
        if let Some(flip) = self.flip {
            fields.push(("flip", Value::from(flip)));
        }
        if let Some(mirror) = self.mirror {
            fields.push(("mirror", Value::from(mirror)));
        }
        if let Some(quality) = self.compress_quality {
            fields.push(("compress_quality", Value::from(quality)));
        }
        if let Some(format) = &self.format {
            fields.push(("format", Value::from(format.trim().to_lowercase())));
        }
        if let Some(filters) = self.filters.as_ref().filter(|f| !f.is_empty()) {
            let map: Map<String, Value> = filters
                .iter()
                .map(|(name, on)| (name.clone(), Value::from(*on)))
                .collect();
            fields.push(("filters", Value::Object(map)));
        }
        fields
    }

    /// Present fields as a flat JSON object, used for placeholder metadata
    /// and the dispatch message.
    pub fn to_flat_map(&self) -> Map<String, Value> {
        self.present_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    /// Field-level validation plus the rules the derive cannot express.
    pub fn ensure_valid(&self) -> Result<(), AppError> {
        self.validate()?;

        if self.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one transformation must be specified".to_string(),
            ));
        }

        if let Some(format) = &self.format {
            let normalized = format.trim().to_lowercase();
            if !SUPPORTED_OUTPUT_FORMATS.contains(&normalized.as_str()) {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported output format '{}'. Supported: {}",
                    format,
                    SUPPORTED_OUTPUT_FORMATS.join(", ")
                )));
            }
        }

        Ok(())
    }
}

/// Body of `POST /images/{id}/transform`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransformRequest {
    pub transformations: TransformationSpec,
}

/// Message handed to the transformation worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationRequest {
    pub original_id: String,
    /// Fingerprint; also the id of the placeholder record
    pub new_id: String,
    pub user_id: Uuid,
    pub transformations: Map<String, Value>,
}

/// What the worker reports back once the derived image is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationOutcome {
    pub storage_url: String,
    pub mimetype: String,
    pub size_bytes: i64,
}
