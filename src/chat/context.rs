//! Context assembly: retrieve, reconcile against the record store, pick the photo.

use base64::Engine as _;
use tracing::{debug, warn};

use super::PhotoRef;
use crate::error::{Degradation, PhotoError};
use crate::index::{SearchHit, SemanticSearch};
use crate::records::{Photo, RecordStore};

/// Default number of hits pulled from the index per question.
pub const TOP_K: usize = 3;

/// Upper bound on hits per question; larger settings are clamped to it.
pub const MAX_TOP_K: usize = 50;

/// Context block used when retrieval yields nothing.
pub const NO_CONTEXT_PLACEHOLDER: &str = "no specific related entry was found, but—";

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Output of [`assemble_context`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Rank-labelled narratives joined into one block.
    pub block: String,
    /// Photo of the top-ranked memorial only.
    pub photo: PhotoRef,
    pub degradations: Vec<Degradation>,
}

/// Retrieve up to `k` memorials for `question` and build the prompt context.
///
/// Never fails. Each fallback taken is recorded in `degradations`.
pub async fn assemble_context(
    search: &dyn SemanticSearch,
    store: &dyn RecordStore,
    question: &str,
    k: usize,
) -> AssembledContext {
    let k = k.clamp(1, MAX_TOP_K);
    let mut degradations = Vec::new();

    let hits = match search.search(question, k).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, "semantic search failed; continuing without context");
            degradations.push(Degradation::Retrieval);
            Vec::new()
        }
    };

    if hits.is_empty() {
        return AssembledContext {
            block: NO_CONTEXT_PLACEHOLDER.to_string(),
            photo: PhotoRef::NoPhoto,
            degradations,
        };
    }

    let photo_candidate = hits[0].document.metadata().ok().map(|m| m.memorial_id);
    let mut photo = PhotoRef::NoPhoto;
    let mut sections = Vec::with_capacity(k.min(hits.len()));

    for (rank, hit) in hits.iter().take(k).enumerate() {
        let narrative = match resolve_hit(store, hit, photo_candidate, &mut photo).await {
            Ok(text) => text,
            Err(degradation) => {
                degradations.push(degradation);
                hit.document.page_content.clone()
            }
        };
        sections.push(format!("--- Memory {} ---\n{}", rank + 1, narrative));
    }

    if photo == PhotoRef::ProcessingError {
        degradations.push(Degradation::PhotoEncoding);
    }

    debug!(
        hits = hits.len(),
        used = sections.len(),
        degradations = degradations.len(),
        "context assembled"
    );

    AssembledContext {
        block: sections.join("\n\n"),
        photo,
        degradations,
    }
}

/// Authoritative narrative for one hit. Sets `photo` when the hit is the photo candidate.
async fn resolve_hit(
    store: &dyn RecordStore,
    hit: &SearchHit,
    photo_candidate: Option<i64>,
    photo: &mut PhotoRef,
) -> Result<String, Degradation> {
    let memorial_id = match hit.document.metadata() {
        Ok(meta) => meta.memorial_id,
        Err(e) => {
            warn!(error = %e, "index hit has unusable metadata; using snapshot text");
            return Err(Degradation::MissingMetadata);
        }
    };

    let memorial = match store.memorial(memorial_id).await {
        Ok(Some(memorial)) => memorial,
        Ok(None) => {
            warn!(memorial_id, "index hit points at a missing memorial; using snapshot text");
            return Err(Degradation::RecordMissing);
        }
        Err(e) => {
            warn!(memorial_id, error = %e, "memorial lookup failed; using snapshot text");
            return Err(Degradation::RecordLookup);
        }
    };

    if photo_candidate == Some(memorial_id) {
        if let Some(stored) = &memorial.photo {
            *photo = match resolve_photo(stored) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(memorial_id, error = %e, "photo could not be encoded");
                    PhotoRef::ProcessingError
                }
            };
        }
    }

    Ok(memorial.diary_text)
}

/// Turn a stored photo into what the client displays.
///
/// Bytes become a JPEG data URI, a non-blank path passes through, and blank
/// values mean no photo.
pub fn resolve_photo(photo: &Photo) -> Result<PhotoRef, PhotoError> {
    match photo {
        Photo::Blob(bytes) if bytes.is_empty() => Ok(PhotoRef::NoPhoto),
        Photo::Blob(bytes) => Ok(PhotoRef::DataUri(format!(
            "{JPEG_DATA_URI_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ))),
        Photo::Path(path) if path.trim().is_empty() => Ok(PhotoRef::NoPhoto),
        Photo::Path(path) => Ok(PhotoRef::Location(path.clone())),
        Photo::Unsupported(kind) => Err(PhotoError::Unsupported(kind.clone())),
    }
}
