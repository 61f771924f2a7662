//! The chat flow: context assembly, family lookup, prompt, model call.
//!
//! [`ChatService::respond`] never fails. Every collaborator failure is absorbed
//! into a fallback and reported back as a [`Degradation`].

pub mod context;
pub mod family;
pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use tracing::info;

use crate::error::Degradation;
use crate::index::SemanticSearch;
use crate::llm::ChatModel;
use crate::records::RecordStore;

pub use context::{
    assemble_context, AssembledContext, MAX_TOP_K, NO_CONTEXT_PLACEHOLDER, TOP_K,
};
pub use family::{render_family_lines, resolve_family, FamilyMember, FAMILY_LIMIT};
pub use prompt::{build_prompt, generate_reply, FALLBACK_REPLY};

/// Incoming `/chat` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    pub family_id: i64,
    pub user_id: i64,
}

/// What the client shows next to the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoRef {
    /// `data:image/jpeg;base64,...` built from stored bytes.
    DataUri(String),
    /// Stored path or URL, passed through.
    Location(String),
    NoPhoto,
    ProcessingError,
}

impl PhotoRef {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DataUri(uri) => uri,
            Self::Location(location) => location,
            Self::NoPhoto => "no photo",
            Self::ProcessingError => "image processing error",
        }
    }
}

impl Serialize for PhotoRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `/chat` response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResult {
    pub response: String,
    pub photo: PhotoRef,
}

/// A result plus the fallbacks taken to produce it.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub result: ChatResult,
    pub degradations: Vec<Degradation>,
}

/// Long-lived handles for answering chat requests.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn RecordStore>,
    search: Arc<dyn SemanticSearch>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        search: Arc<dyn SemanticSearch>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            store,
            search,
            model,
            top_k: TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.clamp(1, MAX_TOP_K);
        self
    }

    pub async fn respond(&self, request: &ChatRequest) -> ChatOutcome {
        let (context, (members, family_degradation)) = tokio::join!(
            assemble_context(
                self.search.as_ref(),
                self.store.as_ref(),
                &request.user_input,
                self.top_k,
            ),
            resolve_family(self.store.as_ref(), request.family_id, request.user_id),
        );

        let prompt = build_prompt(
            &request.user_input,
            &context.block,
            &render_family_lines(&members),
        );
        let (response, model_degradation) = generate_reply(self.model.as_ref(), &prompt).await;

        let mut degradations = context.degradations;
        degradations.extend(family_degradation);
        degradations.extend(model_degradation);

        info!(
            family_id = request.family_id,
            user_id = request.user_id,
            degraded = !degradations.is_empty(),
            "chat request answered"
        );

        ChatOutcome {
            result: ChatResult {
                response,
                photo: context.photo,
            },
            degradations,
        }
    }
}
