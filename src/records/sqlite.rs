//! SQLite-backed [`RecordStore`].
//!
//! The free functions take a plain `&Connection` and are what the tests
//! exercise directly; [`SqliteRecordStore`] wraps them for the async request
//! path, moving each call onto the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Memorial, Photo, RecordStore, Relationship};
use crate::error::StoreError;

const MEMORIAL_COLUMNS: &str = "memorial_id, family_id, latitude, longitude, location, \
                                diary_text, photo, timestamp";

/// Shared-connection record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Row counts for progress messages, without loading the rows.
    pub async fn memorial_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_memorials(conn)).await
    }

    pub async fn missing_location_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_missing_location(conn)).await
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn memorial(&self, memorial_id: i64) -> Result<Option<Memorial>, StoreError> {
        self.with_conn(move |conn| get_memorial(conn, memorial_id))
            .await
    }

    async fn all_memorials(&self) -> Result<Vec<Memorial>, StoreError> {
        self.with_conn(|conn| list_memorials(conn)).await
    }

    async fn relationships(
        &self,
        family_id: i64,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<Relationship>, StoreError> {
        self.with_conn(move |conn| list_relationships(conn, family_id, user_id, limit))
            .await
    }

    async fn memorials_missing_location(&self) -> Result<Vec<Memorial>, StoreError> {
        self.with_conn(|conn| list_missing_location(conn)).await
    }

    async fn set_locations(&self, updates: Vec<(i64, String)>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| update_locations(conn, &updates))
            .await
    }
}

/// Fetch a single memorial by id.
pub fn get_memorial(conn: &Connection, memorial_id: i64) -> Result<Option<Memorial>, StoreError> {
    let sql = format!("SELECT {MEMORIAL_COLUMNS} FROM memorials WHERE memorial_id = ?1");
    let memorial = conn
        .query_row(&sql, params![memorial_id], memorial_from_row)
        .optional()?;
    Ok(memorial)
}

/// Every memorial in id order.
pub fn list_memorials(conn: &Connection) -> Result<Vec<Memorial>, StoreError> {
    let sql = format!("SELECT {MEMORIAL_COLUMNS} FROM memorials ORDER BY memorial_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], memorial_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const MISSING_LOCATION: &str = "latitude IS NOT NULL AND longitude IS NOT NULL \
     AND (location IS NULL OR location = '')";

pub fn count_memorials(conn: &Connection) -> Result<usize, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM memorials", [], |row| row.get(0))?;
    Ok(n as usize)
}

pub fn count_missing_location(conn: &Connection) -> Result<usize, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM memorials WHERE {MISSING_LOCATION}");
    let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(n as usize)
}

/// Memorials with both coordinates set and a NULL or empty place name.
pub fn list_missing_location(conn: &Connection) -> Result<Vec<Memorial>, StoreError> {
    let sql = format!(
        "SELECT {MEMORIAL_COLUMNS} FROM memorials WHERE {MISSING_LOCATION} ORDER BY memorial_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], memorial_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Relationship rows for a family/user pair, capped at `limit`.
pub fn list_relationships(
    conn: &Connection,
    family_id: i64,
    user_id: i64,
    limit: usize,
) -> Result<Vec<Relationship>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT relation_id, family_id, user_id, relation, calling_name \
         FROM family_relationships WHERE family_id = ?1 AND user_id = ?2 LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![family_id, user_id, limit as i64], |row| {
            Ok(Relationship {
                relation_id: row.get(0)?,
                family_id: row.get(1)?,
                user_id: row.get(2)?,
                relation: row.get(3)?,
                calling_name: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Write place names inside one transaction. Returns the number of rows changed.
pub fn update_locations(
    conn: &mut Connection,
    updates: &[(i64, String)],
) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    let mut changed = 0;
    {
        let mut stmt = tx.prepare("UPDATE memorials SET location = ?1 WHERE memorial_id = ?2")?;
        for (memorial_id, location) in updates {
            changed += stmt.execute(params![location, memorial_id])?;
        }
    }
    tx.commit()?;
    Ok(changed)
}

fn memorial_from_row(row: &Row<'_>) -> rusqlite::Result<Memorial> {
    Ok(Memorial {
        memorial_id: row.get(0)?,
        family_id: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        location: text_from_value(row.get_ref(4)?),
        diary_text: text_from_value(row.get_ref(5)?).unwrap_or_default(),
        photo: photo_from_value(row.get_ref(6)?),
        timestamp: timestamp_from_value(row.get_ref(7)?),
    })
}

/// Lenient text read: numbers are rendered, blobs are ignored.
fn text_from_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
    }
}

/// `DATETIME` columns have numeric affinity, so older rows may hold a Unix epoch.
fn timestamp_from_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Integer(secs) => Some(
            chrono::DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| secs.to_string()),
        ),
        other => text_from_value(other),
    }
}

fn photo_from_value(value: ValueRef<'_>) -> Option<Photo> {
    match value {
        ValueRef::Null => None,
        ValueRef::Blob(bytes) => Some(Photo::Blob(bytes.to_vec())),
        ValueRef::Text(text) => Some(Photo::Path(String::from_utf8_lossy(text).into_owned())),
        ValueRef::Integer(_) => Some(Photo::Unsupported("integer".into())),
        ValueRef::Real(_) => Some(Photo::Unsupported("real".into())),
    }
}
