//! SQL DDL for the record database.
//!
//! Defines the `memorials`, `family_relationships`, and `schema_meta` tables.
//! The `memorials` table is created in its version-1 shape (no `timestamp`
//! column); [`super::migrations`] brings it forward. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Diary entries. `photo` is left untyped: it holds either a BLOB or a TEXT path/URL.
CREATE TABLE IF NOT EXISTS memorials (
    memorial_id INTEGER PRIMARY KEY,
    family_id INTEGER NOT NULL,
    latitude REAL,
    longitude REAL,
    location TEXT,
    diary_text TEXT NOT NULL DEFAULT '',
    photo,
    created_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_memorials_family ON memorials(family_id);

-- How a user addresses each family member
CREATE TABLE IF NOT EXISTS family_relationships (
    relation_id INTEGER PRIMARY KEY,
    family_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    relation TEXT NOT NULL,
    calling_name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relationships_family_user
    ON family_relationships(family_id, user_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
