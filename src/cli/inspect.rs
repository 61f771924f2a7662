//! CLI `inspect-index` command: show the first stored snapshots.

use anyhow::Result;

use heirloom::config::HeirloomConfig;

use super::open_index;

pub fn inspect_index(config: &HeirloomConfig, limit: usize) -> Result<()> {
    let index = open_index(config)?;
    let info = index.info()?;

    println!("Index: {} ({} entries)", index.path().display(), info.entries);
    println!("{}", "=".repeat(50));

    for (i, doc) in index.documents(limit)?.iter().enumerate() {
        let id = match doc.metadata() {
            Ok(meta) => meta.memorial_id.to_string(),
            Err(e) => format!("invalid metadata ({e})"),
        };
        println!();
        println!("[{}] memorial {id}", i + 1);
        for line in doc.page_content.lines() {
            println!("  {line}");
        }
    }

    Ok(())
}
