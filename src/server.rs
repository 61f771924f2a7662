//! HTTP surface: the four POST endpoints the frontend calls.
//!
//! Every handler answers 200 with its payload. Internal failures show up in
//! the body (`"error: ..."` messages, fallback replies) and, for `/chat`, in
//! the `x-heirloom-degraded` header.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::chat::{resolve_family, ChatRequest, ChatService, FamilyMember};
use crate::config::HeirloomConfig;
use crate::db;
use crate::embedding;
use crate::error::Degradation;
use crate::geocode::{update_locations, Geocoder, GoogleGeocoder};
use crate::index::{refresh_index, SemanticIndex};
use crate::llm;
use crate::records::{RecordStore, SqliteRecordStore};

/// Response header listing the fallbacks a `/chat` answer went through.
pub const DEGRADED_HEADER: &str = "x-heirloom-degraded";

/// Handles shared by every request. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub index: Arc<SemanticIndex>,
    pub chat: ChatService,
    /// `None` when no Maps API key is configured.
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl AppState {
    /// Open the database and index and construct the external clients.
    ///
    /// Any failure here is fatal.
    pub fn initialize(config: &HeirloomConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        info!(db = %db_path.display(), "database ready");
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::new(Arc::new(Mutex::new(conn))));

        let embedder: Arc<dyn embedding::EmbeddingProvider> =
            Arc::from(embedding::create_provider(config)?);
        let index = Arc::new(
            SemanticIndex::open(config.resolved_index_path(), embedder)
                .context("failed to open semantic index")?,
        );

        let model: Arc<dyn llm::ChatModel> = Arc::from(llm::create_model(config)?);
        let chat = ChatService::new(store.clone(), index.clone(), model)
            .with_top_k(config.retrieval.effective_top_k());

        let geocoder = if config.geocoding.api_key.is_empty() {
            warn!("GOOGLE_MAPS_API_KEY not set; /update-location is disabled");
            None
        } else {
            let google: Arc<dyn Geocoder> = Arc::new(GoogleGeocoder::new(&config.geocoding)?);
            Some(google)
        };

        Ok(Self {
            store,
            index,
            chat,
            geocoder,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FamilyRequest {
    pub family_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FamilyResponse {
    pub family: Vec<FamilyMember>,
}

/// CORS for the configured frontend origin, or any origin when unset.
pub fn cors_layer(allowed_origin: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = allowed_origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("invalid frontend origin: {origin}"))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/update-location", post(update_location))
        .route("/update-vector", post(update_vector))
        .route("/family-info", post(family_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let outcome = state.chat.respond(&request).await;
    let mut response = Json(outcome.result).into_response();

    if let Some(value) = degraded_header_value(&outcome.degradations) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(DEGRADED_HEADER), value);
    }
    response
}

/// Comma-separated distinct degradation kinds, in first-seen order.
fn degraded_header_value(degradations: &[Degradation]) -> Option<HeaderValue> {
    let mut kinds: Vec<&str> = Vec::new();
    for d in degradations {
        if !kinds.contains(&d.as_str()) {
            kinds.push(d.as_str());
        }
    }
    if kinds.is_empty() {
        return None;
    }
    HeaderValue::from_str(&kinds.join(",")).ok()
}

async fn update_location(State(state): State<AppState>) -> Json<MessageResponse> {
    let message = match &state.geocoder {
        Some(geocoder) => update_locations(state.store.as_ref(), geocoder.as_ref()).await,
        None => "error: geocoding is not configured".to_string(),
    };
    Json(MessageResponse { message })
}

async fn update_vector(State(state): State<AppState>) -> Json<MessageResponse> {
    let message = refresh_index(state.store.as_ref(), &state.index).await;
    Json(MessageResponse { message })
}

async fn family_info(
    State(state): State<AppState>,
    Json(request): Json<FamilyRequest>,
) -> Json<FamilyResponse> {
    let (family, _) = resolve_family(state.store.as_ref(), request.family_id, request.user_id).await;
    Json(FamilyResponse { family })
}

/// Initialize state and serve until ctrl-c.
pub async fn serve(config: HeirloomConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::initialize(&config)?;
    let app = router(state, cors_layer(config.server.allowed_origin.as_deref())?);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "heirloom listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await?;

    Ok(())
}
