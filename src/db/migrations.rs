//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Whether `table` has a column named `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.unchecked_transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;

        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: add `memorials.timestamp` and backfill it from `created_at`.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    if column_exists(conn, "memorials", "timestamp")? {
        tracing::info!("memorials.timestamp already present");
    } else {
        conn.execute("ALTER TABLE memorials ADD COLUMN timestamp TEXT", [])?;
        tracing::info!("added memorials.timestamp");
    }

    if !column_exists(conn, "memorials", "created_at")? {
        tracing::info!("memorials.created_at absent; nothing to backfill");
        return Ok(());
    }

    let copied = conn.execute(
        "UPDATE memorials SET timestamp = created_at \
         WHERE created_at IS NOT NULL AND timestamp IS NULL",
        [],
    )?;
    tracing::info!(rows = copied, "backfilled memorials.timestamp from created_at");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_v1_to_v2_adds_timestamp_column() {
        let conn = test_db();
        assert!(!column_exists(&conn, "memorials", "timestamp").unwrap());

        run_migrations(&conn).unwrap();

        assert!(column_exists(&conn, "memorials", "timestamp").unwrap());
    }

    #[test]
    fn migration_tolerates_existing_timestamp_column() {
        let conn = test_db();
        conn.execute("ALTER TABLE memorials ADD COLUMN timestamp TEXT", [])
            .unwrap();
        conn.execute(
            "INSERT INTO memorials (memorial_id, family_id, created_at, timestamp) \
             VALUES (1, 1, '2024-01-01 10:00:00', '2023-12-31 09:00:00')",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        // an existing timestamp is never overwritten
        let ts: String = conn
            .query_row("SELECT timestamp FROM memorials WHERE memorial_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ts, "2023-12-31 09:00:00");
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
