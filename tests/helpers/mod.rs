#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, Connection};

use heirloom::db;
use heirloom::embedding::EmbeddingProvider;
use heirloom::error::{EmbeddingError, GeocodeError, ModelError, RetrievalError, StoreError};
use heirloom::geocode::Geocoder;
use heirloom::index::{DocumentMetadata, IndexedDocument, SearchHit, SemanticSearch};
use heirloom::llm::ChatModel;
use heirloom::records::{Memorial, RecordStore, Relationship, SqliteRecordStore};

pub const TEST_DIMS: usize = 8;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Insert a memorial for family 1 with the given text and raw photo value.
pub fn insert_memorial(conn: &Connection, id: i64, text: &str, photo: Value) {
    conn.execute(
        "INSERT INTO memorials (memorial_id, family_id, diary_text, photo, timestamp) \
         VALUES (?1, 1, ?2, ?3, '2024-05-12 10:00:00')",
        params![id, text, photo],
    )
    .unwrap();
}

/// Insert a memorial with coordinates and an optional place name.
pub fn insert_located(conn: &Connection, id: i64, lat: f64, lon: f64, location: Option<&str>) {
    conn.execute(
        "INSERT INTO memorials (memorial_id, family_id, latitude, longitude, location, diary_text) \
         VALUES (?1, 1, ?2, ?3, ?4, 'trip')",
        params![id, lat, lon, location],
    )
    .unwrap();
}

pub fn insert_relationship(
    conn: &Connection,
    family_id: i64,
    user_id: i64,
    relation: &str,
    calling_name: &str,
) {
    conn.execute(
        "INSERT INTO family_relationships (family_id, user_id, relation, calling_name) \
         VALUES (?1, ?2, ?3, ?4)",
        params![family_id, user_id, relation, calling_name],
    )
    .unwrap();
}

pub fn location_of(conn: &Connection, id: i64) -> Option<String> {
    conn.query_row(
        "SELECT location FROM memorials WHERE memorial_id = ?1",
        params![id],
        |row| row.get(0),
    )
    .unwrap()
}

/// Wrap a connection as a shared record store, keeping a handle for assertions.
pub fn store(conn: Connection) -> (Arc<SqliteRecordStore>, Arc<Mutex<Connection>>) {
    let conn = Arc::new(Mutex::new(conn));
    (Arc::new(SqliteRecordStore::new(Arc::clone(&conn))), conn)
}

/// A search hit pointing at `memorial_id` with the given snapshot text.
pub fn hit(memorial_id: i64, snapshot: &str, distance: f64) -> SearchHit {
    SearchHit {
        document: IndexedDocument {
            page_content: snapshot.to_string(),
            metadata: serde_json::to_string(&DocumentMetadata::new(memorial_id)).unwrap(),
        },
        distance,
    }
}

/// A search hit with arbitrary raw metadata.
pub fn raw_hit(metadata: &str, snapshot: &str) -> SearchHit {
    SearchHit {
        document: IndexedDocument {
            page_content: snapshot.to_string(),
            metadata: metadata.to_string(),
        },
        distance: 0.5,
    }
}

/// Embeds text onto one of a few keyword axes.
pub struct KeywordEmbedder;

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIMS];
    let axis = ["park", "beach", "dinner", "school"]
        .iter()
        .position(|kw| text.contains(kw))
        .unwrap_or(TEST_DIMS - 1);
    v[axis] = 1.0;
    v
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        TEST_DIMS
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 503,
            body: "unavailable".into(),
        })
    }

    fn dimensions(&self) -> usize {
        TEST_DIMS
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

/// Canned search results, truncated to `k`.
pub struct FakeSearch {
    hits: Option<Vec<SearchHit>>,
    honor_k: bool,
}

impl FakeSearch {
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            hits: Some(hits),
            honor_k: true,
        }
    }

    /// Returns every hit regardless of the requested `k`.
    pub fn ignoring_k(hits: Vec<SearchHit>) -> Self {
        Self {
            hits: Some(hits),
            honor_k: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: None,
            honor_k: true,
        }
    }
}

#[async_trait]
impl SemanticSearch for FakeSearch {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        match &self.hits {
            Some(hits) if self.honor_k => Ok(hits.iter().take(k).cloned().collect()),
            Some(hits) => Ok(hits.clone()),
            None => Err(RetrievalError::LockPoisoned),
        }
    }
}

/// Chat model that replies with a fixed string (or fails) and records the prompt.
pub struct FakeModel {
    reply: Option<String>,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            last_prompt: Mutex::new(None),
        }
    }

    pub fn prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        self.reply.clone().ok_or(ModelError::Api {
            status: 500,
            body: "model down".into(),
        })
    }
}

/// Record store whose reads can be made to fail per operation.
pub struct FlakyStore {
    pub inner: Arc<SqliteRecordStore>,
    pub fail_memorial: bool,
    pub fail_relationships: bool,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn memorial(&self, memorial_id: i64) -> Result<Option<Memorial>, StoreError> {
        if self.fail_memorial {
            return Err(StoreError::LockPoisoned);
        }
        self.inner.memorial(memorial_id).await
    }

    async fn all_memorials(&self) -> Result<Vec<Memorial>, StoreError> {
        self.inner.all_memorials().await
    }

    async fn relationships(
        &self,
        family_id: i64,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Relationship>, StoreError> {
        if self.fail_relationships {
            return Err(StoreError::LockPoisoned);
        }
        self.inner.relationships(family_id, user_id, limit).await
    }

    async fn memorials_missing_location(&self) -> Result<Vec<Memorial>, StoreError> {
        self.inner.memorials_missing_location().await
    }

    async fn set_locations(&self, updates: Vec<(i64, String)>) -> Result<usize, StoreError> {
        self.inner.set_locations(updates).await
    }
}

/// Geocoder answering from a fixed rule: negative latitude fails, zero latitude has no address.
pub struct FakeGeocoder;

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError> {
        if latitude < 0.0 {
            return Err(GeocodeError::Rejected {
                status: "OVER_QUERY_LIMIT".into(),
            });
        }
        if latitude == 0.0 {
            return Ok(None);
        }
        if latitude == 1.0 {
            return Ok(Some(String::new()));
        }
        Ok(Some(format!("place {latitude:.1},{longitude:.1}")))
    }
}

pub fn blob(bytes: &[u8]) -> Value {
    Value::Blob(bytes.to_vec())
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
