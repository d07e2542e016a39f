use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a placeholder stands with respect to the worker transport.
///
/// Source records carry no dispatch state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    /// Claimed by a caller that is about to send the dispatch message
    Pending,
    Dispatched,
    /// The last dispatch attempt failed; the next identical request may retry
    Failed,
}

impl Display for DispatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DispatchState::Pending => write!(f, "pending"),
            DispatchState::Dispatched => write!(f, "dispatched"),
            DispatchState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DispatchState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DispatchState::Pending),
            "dispatched" => Ok(DispatchState::Dispatched),
            "failed" => Ok(DispatchState::Failed),
            _ => Err(anyhow::anyhow!("Invalid dispatch state: {}", s)),
        }
    }
}

/// A stored image or a pending/completed derived image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ArtifactRecord {
    pub id: String,
    pub owner_id: Uuid,
    pub filename: String,
    /// Storage key the blob lives under
    pub storage_url: String,
    pub mimetype: String,
    pub size_bytes: i64,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub is_transformed: bool,
    /// Id of the image this one is derived from; `None` for uploads
    pub source_id: Option<String>,
    pub dispatch_state: Option<DispatchState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// True for a derived record whose worker has not reported back yet
    pub fn is_in_flight(&self) -> bool {
        self.source_id.is_some() && !self.is_transformed
    }

    /// Build the placeholder for a derived image of `source`.
    ///
    /// The placeholder points at the source blob until the worker replaces it.
    pub fn placeholder_for(
        source: &ArtifactRecord,
        id: String,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> NewArtifact {
        NewArtifact {
            id,
            owner_id: source.owner_id,
            filename: format!("transformed_{}", source.filename),
            storage_url: source.storage_url.clone(),
            mimetype: source.mimetype.clone(),
            size_bytes: 0,
            metadata: serde_json::Value::Object(metadata),
            source_id: Some(source.id.clone()),
            dispatch_state: Some(DispatchState::Pending),
        }
    }
}

/// Insert payload for an artifact row
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub id: String,
    pub owner_id: Uuid,
    pub filename: String,
    pub storage_url: String,
    pub mimetype: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
    pub source_id: Option<String>,
    pub dispatch_state: Option<DispatchState>,
}

impl NewArtifact {
    /// Materialize the row as the store would return it
    pub fn into_record(self, now: DateTime<Utc>) -> ArtifactRecord {
        ArtifactRecord {
            id: self.id,
            owner_id: self.owner_id,
            filename: self.filename,
            storage_url: self.storage_url,
            mimetype: self.mimetype,
            size_bytes: self.size_bytes,
            metadata: self.metadata,
            is_transformed: false,
            source_id: self.source_id,
            dispatch_state: self.dispatch_state,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One page of a user's artifacts
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArtifactPage {
    pub items: Vec<ArtifactRecord>,
    pub page: u32,
    pub limit: u32,
    pub total_count: i64,
    pub total_pages: i64,
}

impl ArtifactPage {
    pub fn new(items: Vec<ArtifactRecord>, page: u32, limit: u32, total_count: i64) -> Self {
        let limit_i64 = i64::from(limit.max(1));
        Self {
            items,
            page,
            limit,
            total_count,
            total_pages: (total_count + limit_i64 - 1) / limit_i64,
        }
    }
}
