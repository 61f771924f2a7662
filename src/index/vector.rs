//! sqlite-vec backed [`SemanticSearch`] implementation.
//!
//! The index lives in its own SQLite file, separate from the record database.
//! It is never updated in place: [`SemanticIndex::rebuild`] writes a complete
//! new file next to the old one, renames it over, and only then swaps the live
//! connection handle. Queries that already hold the old handle finish against
//! the old file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use super::{IndexedDocument, SearchHit, SemanticSearch};
use crate::db;
use crate::embedding::{embedding_to_bytes, EmbeddingProvider};
use crate::error::RetrievalError;
use crate::records::Memorial;

/// Layout version of the index file.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

const INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    doc_id INTEGER PRIMARY KEY,
    page_content TEXT NOT NULL,
    metadata TEXT NOT NULL
);
"#;

/// Descriptive facts about the live index file.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub schema_version: u32,
    pub dimensions: usize,
    pub embedding_model: String,
    pub built_at: String,
    pub entries: usize,
}

/// Persisted nearest-neighbour index with atomic rebuild.
pub struct SemanticIndex {
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    live: RwLock<Arc<Mutex<Connection>>>,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl SemanticIndex {
    /// Open the index at `path`, creating an empty one if the file is absent.
    ///
    /// Fails if the stored vector dimensions differ from the embedder's.
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        db::load_sqlite_vec();
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
            replace_index_file(&path, embedder.dimensions(), embedder.model(), &[], &[])?;
            info!(path = %path.display(), "created empty semantic index");
        }

        let conn = open_index_connection(&path)?;
        let info = read_info(&conn)?;
        anyhow::ensure!(
            info.dimensions == embedder.dimensions(),
            "index at {} stores {}-dim vectors but the embedder produces {}; rebuild the index",
            path.display(),
            info.dimensions,
            embedder.dimensions()
        );
        if info.embedding_model != embedder.model() {
            warn!(
                stored = %info.embedding_model,
                configured = %embedder.model(),
                "embedding model changed; rebuild the index to re-embed all memorials"
            );
        }
        info!(path = %path.display(), entries = info.entries, "semantic index ready");

        Ok(Self {
            path,
            embedder,
            live: RwLock::new(Arc::new(Mutex::new(conn))),
            rebuild_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-embed every memorial and replace the index. Returns the entry count.
    ///
    /// On any failure the previous index stays live and untouched.
    pub async fn rebuild(&self, memorials: &[Memorial]) -> Result<usize> {
        let _guard = self.rebuild_lock.lock().await;

        let documents: Vec<IndexedDocument> =
            memorials.iter().map(IndexedDocument::for_memorial).collect();
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();

        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder
                .embed_batch(&texts)
                .await
                .context("failed to embed memorials")?
        };
        anyhow::ensure!(
            embeddings.len() == documents.len(),
            "embedder returned {} vectors for {} memorials",
            embeddings.len(),
            documents.len()
        );

        let count = documents.len();
        let path = self.path.clone();
        let dims = self.embedder.dimensions();
        let model = self.embedder.model().to_string();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            replace_index_file(&path, dims, &model, &documents, &embeddings)?;
            open_index_connection(&path)
        })
        .await
        .context("index rebuild task failed")??;

        let mut live = self
            .live
            .write()
            .map_err(|_| anyhow!("index handle lock poisoned"))?;
        *live = Arc::new(Mutex::new(conn));

        Ok(count)
    }

    /// The first `limit` stored documents, in insertion order.
    pub fn documents(&self, limit: usize) -> Result<Vec<IndexedDocument>> {
        let handle = self.current().map_err(|e| anyhow!(e))?;
        let conn = handle.lock().map_err(|_| anyhow!("index lock poisoned"))?;
        let mut stmt = conn
            .prepare("SELECT page_content, metadata FROM documents ORDER BY doc_id LIMIT ?1")?;
        let docs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(IndexedDocument {
                    page_content: row.get(0)?,
                    metadata: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Number of stored documents.
    pub fn len(&self) -> Result<usize> {
        Ok(self.info()?.entries)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Metadata and entry count of the live index.
    pub fn info(&self) -> Result<IndexInfo> {
        let handle = self.current().map_err(|e| anyhow!(e))?;
        let conn = handle.lock().map_err(|_| anyhow!("index lock poisoned"))?;
        read_info(&conn)
    }

    fn current(&self) -> Result<Arc<Mutex<Connection>>, RetrievalError> {
        self.live
            .read()
            .map(|handle| Arc::clone(&handle))
            .map_err(|_| RetrievalError::LockPoisoned)
    }
}

#[async_trait]
impl SemanticSearch for SemanticIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let handle = self.current()?;

        tokio::task::spawn_blocking(move || -> Result<Vec<SearchHit>, RetrievalError> {
            let conn = handle.lock().map_err(|_| RetrievalError::LockPoisoned)?;
            Ok(query_nearest(&conn, &embedding, k)?)
        })
        .await
        .map_err(|e| RetrievalError::Task(e.to_string()))?
    }
}

/// KNN query joined back to the stored snapshots, ascending by distance.
fn query_nearest(
    conn: &Connection,
    embedding: &[f32],
    k: usize,
) -> rusqlite::Result<Vec<SearchHit>> {
    let mut stmt = conn.prepare(
        "SELECT d.page_content, d.metadata, knn.distance \
         FROM (SELECT rowid, distance FROM documents_vec \
               WHERE embedding MATCH ?1 AND k = ?2) AS knn \
         JOIN documents d ON d.doc_id = knn.rowid \
         ORDER BY knn.distance",
    )?;
    let hits = stmt
        .query_map(params![embedding_to_bytes(embedding), k as i64], |row| {
            Ok(SearchHit {
                document: IndexedDocument {
                    page_content: row.get(0)?,
                    metadata: row.get(1)?,
                },
                distance: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

fn open_index_connection(path: &Path) -> Result<Connection> {
    Connection::open(path)
        .with_context(|| format!("failed to open semantic index at {}", path.display()))
}

fn read_info(conn: &Connection) -> Result<IndexInfo> {
    let meta = |key: &str| -> Result<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    };

    let dimensions = meta("dimensions")?
        .and_then(|v| v.parse::<usize>().ok())
        .context("index file has no valid dimensions entry")?;
    let schema_version = meta("schema_version")?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    anyhow::ensure!(
        schema_version == INDEX_SCHEMA_VERSION,
        "unsupported index schema version {schema_version}"
    );

    let entries: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

    Ok(IndexInfo {
        schema_version,
        dimensions,
        embedding_model: meta("embedding_model")?.unwrap_or_default(),
        built_at: meta("built_at")?.unwrap_or_default(),
        entries: entries as usize,
    })
}

/// `<path>.tmp` beside the live index file.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a complete index to a temp file, then rename it over `path`.
fn replace_index_file(
    path: &Path,
    dims: usize,
    model: &str,
    documents: &[IndexedDocument],
    embeddings: &[Vec<f32>],
) -> Result<()> {
    let tmp = temp_path(path);
    if tmp.exists() {
        std::fs::remove_file(&tmp)
            .with_context(|| format!("failed to remove stale {}", tmp.display()))?;
    }

    if let Err(e) = write_index_file(&tmp, dims, model, documents, embeddings) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move new index into {}", path.display()))?;
    Ok(())
}

fn write_index_file(
    path: &Path,
    dims: usize,
    model: &str,
    documents: &[IndexedDocument],
    embeddings: &[Vec<f32>],
) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to create index file {}", path.display()))?;
    conn.execute_batch(INDEX_SCHEMA_SQL)?;
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS documents_vec USING vec0(embedding FLOAT[{dims}]);"
    ))?;

    let tx = conn.transaction()?;
    {
        let mut meta = tx.prepare("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")?;
        meta.execute(params!["schema_version", INDEX_SCHEMA_VERSION.to_string()])?;
        meta.execute(params!["dimensions", dims.to_string()])?;
        meta.execute(params!["embedding_model", model])?;
        meta.execute(params!["built_at", chrono::Utc::now().to_rfc3339()])?;

        let mut doc_stmt = tx.prepare(
            "INSERT INTO documents (doc_id, page_content, metadata) VALUES (?1, ?2, ?3)",
        )?;
        let mut vec_stmt =
            tx.prepare("INSERT INTO documents_vec (rowid, embedding) VALUES (?1, ?2)")?;

        for (i, (doc, embedding)) in documents.iter().zip(embeddings).enumerate() {
            anyhow::ensure!(
                embedding.len() == dims,
                "embedding {i} has {} dimensions, expected {dims}",
                embedding.len()
            );
            let doc_id = i as i64 + 1;
            doc_stmt.execute(params![doc_id, doc.page_content, doc.metadata])?;
            vec_stmt.execute(params![doc_id, embedding_to_bytes(embedding)])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use tempfile::TempDir;

    /// One-hot vectors keyed on a few words; anything else lands on the last axis.
    struct KeywordEmbedder {
        dims: usize,
        model: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    let axis = if t.contains("park") {
                        0
                    } else if t.contains("beach") {
                        1
                    } else {
                        self.dims - 1
                    };
                    v[axis] = 1.0;
                    v
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model(&self) -> &str {
            self.model
        }
    }

    fn embedder(dims: usize) -> Arc<dyn EmbeddingProvider> {
        Arc::new(KeywordEmbedder {
            dims,
            model: "keyword-test",
        })
    }

    fn memorial(id: i64, text: &str) -> Memorial {
        Memorial {
            memorial_id: id,
            family_id: 1,
            latitude: None,
            longitude: None,
            location: None,
            diary_text: text.into(),
            photo: None,
            timestamp: None,
        }
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/data/vector_store.db")),
            PathBuf::from("/data/vector_store.db.tmp")
        );
    }

    #[test]
    fn open_creates_empty_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.db");

        let index = SemanticIndex::open(&path, embedder(4)).unwrap();

        assert!(path.exists());
        let info = index.info().unwrap();
        assert_eq!(info.entries, 0);
        assert_eq!(info.dimensions, 4);
        assert_eq!(info.embedding_model, "keyword-test");
    }

    #[test]
    fn open_rejects_dimension_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        SemanticIndex::open(&path, embedder(4)).unwrap();

        let err = SemanticIndex::open(&path, embedder(8)).err().unwrap();
        assert!(err.to_string().contains("4-dim"), "got: {err}");
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_nothing() {
        let tmp = TempDir::new().unwrap();
        let index = SemanticIndex::open(tmp.path().join("index.db"), embedder(4)).unwrap();
        assert!(index.search("the park", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuild_then_search_ranks_by_distance() {
        let tmp = TempDir::new().unwrap();
        let index = SemanticIndex::open(tmp.path().join("index.db"), embedder(4)).unwrap();

        let count = index
            .rebuild(&[
                memorial(1, "A day at the beach"),
                memorial(2, "We went to the park"),
                memorial(3, "Cooked dinner together"),
            ])
            .await
            .unwrap();
        assert_eq!(count, 3);

        let hits = index.search("did we go to the park?", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.metadata().unwrap().memorial_id, 2);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);

        assert!(!tmp.path().join("index.db.tmp").exists());
    }

    #[tokio::test]
    async fn search_caps_results_at_k() {
        let tmp = TempDir::new().unwrap();
        let index = SemanticIndex::open(tmp.path().join("index.db"), embedder(4)).unwrap();
        let memorials: Vec<Memorial> = (1..=6).map(|i| memorial(i, "park again")).collect();
        index.rebuild(&memorials).await.unwrap();

        assert_eq!(index.search("park", 3).await.unwrap().len(), 3);
        assert!(index.search("park", 0).await.unwrap().is_empty());
    }
}
