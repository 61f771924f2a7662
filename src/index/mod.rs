//! Semantic index over memorial snapshots.
//!
//! Each [`IndexedDocument`] is a denormalized text snapshot of one memorial
//! plus a small versioned metadata record pointing back at it. The snapshot is
//! not authoritative: callers resolve hits against the record store and fall
//! back to the snapshot only when that fails.

pub mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MetadataError, RetrievalError};
use crate::records::{Memorial, RecordStore};

pub use vector::SemanticIndex;

/// Current version of the document metadata record.
pub const METADATA_VERSION: u32 = 1;

/// Back-reference from an index entry to its memorial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub version: u32,
    pub memorial_id: i64,
}

impl DocumentMetadata {
    pub fn new(memorial_id: i64) -> Self {
        Self {
            version: METADATA_VERSION,
            memorial_id,
        }
    }
}

/// A stored index entry: snapshot text plus raw metadata JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub page_content: String,
    pub metadata: String,
}

impl IndexedDocument {
    /// Snapshot a memorial for embedding.
    pub fn for_memorial(memorial: &Memorial) -> Self {
        let page_content = format!(
            "Memorial ID: {}\nDate: {}\nPlace: {}\nText: {}",
            memorial.memorial_id,
            memorial.timestamp.as_deref().unwrap_or("unknown"),
            memorial
                .location
                .as_deref()
                .filter(|l| !l.is_empty())
                .unwrap_or("unknown"),
            memorial.diary_text,
        );
        let metadata = serde_json::to_string(&DocumentMetadata::new(memorial.memorial_id))
            .unwrap_or_default();
        Self {
            page_content,
            metadata,
        }
    }

    /// Parse and validate the metadata record.
    pub fn metadata(&self) -> Result<DocumentMetadata, MetadataError> {
        let parsed: DocumentMetadata = serde_json::from_str(&self.metadata)?;
        if parsed.version != METADATA_VERSION {
            return Err(MetadataError::UnsupportedVersion(parsed.version));
        }
        Ok(parsed)
    }
}

/// One nearest-neighbour result. Lower distance means more similar.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: IndexedDocument,
    pub distance: f64,
}

/// Similarity query over the index.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Up to `k` hits for `query`, ascending by distance.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RetrievalError>;
}

/// Rebuild the index from every memorial in the store.
///
/// Returns the user-facing status message; failures are reported in the
/// message and leave the previous index live.
pub async fn refresh_index(store: &dyn RecordStore, index: &SemanticIndex) -> String {
    let memorials = match store.all_memorials().await {
        Ok(memorials) => memorials,
        Err(e) => {
            tracing::error!(error = %e, "failed to read memorials for index rebuild");
            return format!("error: {e}");
        }
    };

    match index.rebuild(&memorials).await {
        Ok(count) => {
            tracing::info!(entries = count, "vector store updated");
            format!("vector store updated ({count} entries)")
        }
        Err(e) => {
            tracing::error!(error = %e, "index rebuild failed; previous index kept");
            format!("error: {e:#}")
        }
    }
}
