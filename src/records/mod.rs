//! Memorial and family-relationship records.
//!
//! [`RecordStore`] is the seam the request path reads through; the SQLite
//! implementation lives in [`sqlite`].

pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;

pub use sqlite::SqliteRecordStore;

/// A stored photo. SQLite keeps whatever the writer put in the column, so the
/// value is classified on read instead of being coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Photo {
    /// Raw image bytes.
    Blob(Vec<u8>),
    /// A path or URL pointing at the image.
    Path(String),
    /// Any other SQLite storage class (`integer`, `real`).
    Unsupported(String),
}

/// A diary entry, matching the `memorials` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Memorial {
    pub memorial_id: i64,
    pub family_id: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Place name filled in by geocoding enrichment.
    pub location: Option<String>,
    pub diary_text: String,
    pub photo: Option<Photo>,
    pub timestamp: Option<String>,
}

/// How a user addresses one family member, matching `family_relationships`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub relation_id: i64,
    pub family_id: i64,
    pub user_id: i64,
    /// Relation label, e.g. "mother".
    pub relation: String,
    /// Informal address term, e.g. "mom".
    pub calling_name: String,
}

/// Read access to memorials and relationships, plus the one write the
/// geocoding job needs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one memorial. `Ok(None)` when no row has this id.
    async fn memorial(&self, memorial_id: i64) -> Result<Option<Memorial>, StoreError>;

    /// Every memorial, in id order.
    async fn all_memorials(&self) -> Result<Vec<Memorial>, StoreError>;

    /// Up to `limit` relationship rows for the family/user pair, in storage order.
    async fn relationships(
        &self,
        family_id: i64,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Relationship>, StoreError>;

    /// Memorials that have coordinates but no place name yet.
    async fn memorials_missing_location(&self) -> Result<Vec<Memorial>, StoreError>;

    /// Write place names for the given memorials in one transaction.
    async fn set_locations(&self, updates: Vec<(i64, String)>) -> Result<usize, StoreError>;
}
