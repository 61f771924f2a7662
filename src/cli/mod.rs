pub mod doctor;
pub mod inspect;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use heirloom::chat::{render_family_lines, resolve_family};
use heirloom::config::HeirloomConfig;
use heirloom::db;
use heirloom::embedding;
use heirloom::geocode::{update_locations, GoogleGeocoder};
use heirloom::index::{refresh_index, SemanticIndex};
use heirloom::records::SqliteRecordStore;

fn open_store(config: &HeirloomConfig) -> Result<SqliteRecordStore> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    Ok(SqliteRecordStore::new(Arc::new(Mutex::new(conn))))
}

fn open_index(config: &HeirloomConfig) -> Result<SemanticIndex> {
    let embedder: Arc<dyn embedding::EmbeddingProvider> = Arc::from(
        embedding::create_provider(config).context("failed to create embedding provider")?,
    );
    SemanticIndex::open(config.resolved_index_path(), embedder)
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Fail the command when a job reported an error message.
fn finish(message: String) -> Result<()> {
    if let Some(reason) = message.strip_prefix("error: ") {
        anyhow::bail!("{reason}");
    }
    println!("{message}");
    Ok(())
}

/// Re-embed every memorial and replace the semantic index.
pub async fn rebuild_index(config: &HeirloomConfig) -> Result<()> {
    let store = open_store(config)?;
    let index = open_index(config)?;

    let total = store.memorial_count().await?;
    let pb = spinner(format!(
        "embedding {total} memorials with '{}'...",
        config.embedding.deployment
    ))?;
    let message = refresh_index(&store, &index).await;
    pb.finish_and_clear();

    finish(message)
}

/// Geocode memorials that have coordinates but no place name.
pub async fn update_location(config: &HeirloomConfig) -> Result<()> {
    let store = open_store(config)?;
    let geocoder = GoogleGeocoder::new(&config.geocoding)?;

    let pending = store.missing_location_count().await?;
    let pb = spinner(format!("geocoding {pending} memorials..."))?;
    let message = update_locations(&store, &geocoder).await;
    pb.finish_and_clear();

    finish(message)
}

/// Print the family lines the chat prompt would use.
pub async fn family(config: &HeirloomConfig, family_id: i64, user_id: i64) -> Result<()> {
    let store = open_store(config)?;
    let (members, degradation) = resolve_family(&store, family_id, user_id).await;
    if let Some(kind) = degradation {
        eprintln!("warning: {kind} lookup failed; showing no family data");
    }
    println!("{}", render_family_lines(&members));
    Ok(())
}

/// Apply pending schema migrations and report the version change.
pub fn migrate(config: &HeirloomConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    let before = if db_path.exists() {
        let conn = rusqlite::Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        db::migrations::get_schema_version(&conn).unwrap_or(0)
    } else {
        0
    };

    let conn = db::open_database(&db_path)?;
    let after = db::migrations::get_schema_version(&conn)?;

    if before == after {
        println!("Schema is up to date (version {after}).");
    } else {
        println!("Migrated schema from version {before} to {after}.");
    }
    Ok(())
}
