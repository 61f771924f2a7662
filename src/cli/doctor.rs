//! CLI `doctor` command: database and index diagnostics.

use anyhow::{Context, Result};

use heirloom::config::HeirloomConfig;
use heirloom::db;
use heirloom::db::migrations::CURRENT_SCHEMA_VERSION;

use super::open_index;

pub fn doctor(config: &HeirloomConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Point HEIRLOOM_DB at the memorial database or run `heirloom migrate` to create one.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Heirloom Health Report");
    println!("======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!(
        "Connection:        {}",
        if report.connected { "OK" } else { "FAILED" }
    );
    println!(
        "Schema version:    {} (current {CURRENT_SCHEMA_VERSION})",
        report.schema_version
    );
    println!();
    println!("Row counts:");
    println!("  Memorials:       {}", report.memorial_count);
    println!("  Relationships:   {}", report.relationship_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    println!();
    println!("Semantic index:    {}", config.resolved_index_path().display());
    match open_index(config).and_then(|index| index.info()) {
        Ok(info) => {
            println!("  Entries:         {}", info.entries);
            println!("  Dimensions:      {}", info.dimensions);
            println!("  Stored model:    {}", info.embedding_model);
            println!("  Configured:      {}", config.embedding.deployment);
            println!("  Built at:        {}", info.built_at);
            if info.entries as i64 != report.memorial_count {
                println!("  NOTE: entry count differs from memorials; run `heirloom rebuild-index`.");
            }
        }
        Err(e) => println!("  UNAVAILABLE: {e:#}"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
