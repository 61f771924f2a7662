//! Error taxonomy for the request path.
//!
//! Each external collaborator has its own error type. The chat flow never
//! propagates these to the caller: it absorbs them and records a
//! [`Degradation`] naming the fallback that was applied.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure to turn text into vectors.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding API returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding has {got} dimensions, expected {expected}")]
    Dimensions { expected: usize, got: usize },
}

/// Failure to query the semantic index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index query failed: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("index handle lock poisoned")]
    LockPoisoned,

    #[error("index task failed: {0}")]
    Task(String),
}

/// Failure to read or write the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("database task failed: {0}")]
    Task(String),
}

/// Failure to turn a stored photo into something displayable.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("photo column holds an unsupported {0} value")]
    Unsupported(String),
}

/// Failure of the external chat model call.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model returned no reply text")]
    EmptyReply,
}

/// Failure of the reverse geocoding call.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoding API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("geocoding API rejected the request: {status}")]
    Rejected { status: String },
}

/// Index document metadata that failed validation.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("malformed document metadata: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported document metadata version {0}")]
    UnsupportedVersion(u32),
}

/// A fallback applied while answering a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Index query failed; treated as zero hits.
    Retrieval,
    /// A hit had no usable memorial id; its snapshot text was used.
    MissingMetadata,
    /// A hit pointed at a memorial that no longer exists; snapshot text was used.
    RecordMissing,
    /// Reading a memorial failed; snapshot text was used.
    RecordLookup,
    /// The top photo could not be encoded.
    PhotoEncoding,
    /// Relationship lookup failed; no family lines were used.
    Relationship,
    /// The model call failed; the canned reply was used.
    Model,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::MissingMetadata => "missing_metadata",
            Self::RecordMissing => "record_missing",
            Self::RecordLookup => "record_lookup",
            Self::PhotoEncoding => "photo_encoding",
            Self::Relationship => "relationship",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
