pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the record database at the given path, with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL lets the HTTP workers read while a job writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Summary produced by [`check_database_health`].
#[derive(Debug)]
pub struct HealthReport {
    pub connected: bool,
    pub schema_version: u32,
    pub memorial_count: i64,
    pub relationship_count: i64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Run connectivity, version, row-count and integrity checks.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let ping: i64 = conn
        .query_row("SELECT 1", [], |row| row.get(0))
        .context("connectivity check failed")?;

    let schema_version = migrations::get_schema_version(conn)?;
    let memorial_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM memorials", [], |row| row.get(0))?;
    let relationship_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM family_relationships", [], |row| {
            row.get(0)
        })?;

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    Ok(HealthReport {
        connected: ping == 1,
        schema_version,
        memorial_count,
        relationship_count,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}
