//! Store statistics.
//!
//! Provides a quick summary of what's stored: collection, record and
//! document counts, and on-disk size. Used by `docmem stats` to confirm
//! that ingestion is landing where expected.

use anyhow::Result;

use crate::config::Config;
use crate::store::{open_store, DISTANCE_METRIC};

/// Run the stats command: open the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let records = store.count().await?;
    let documents = store.document_count().await?;
    store.close().await?;

    println!("docmem store stats");
    println!("==================");
    println!();
    println!("  Backend:     {}", config.store.backend);
    if config.store.backend == "sqlite" {
        let size = store_size(&config.store.path);
        println!("  Store:       {}", config.store.path.display());
        println!("  Size:        {}", format_bytes(size));
    }
    println!("  Collection:  {} ({})", config.store.collection, DISTANCE_METRIC);
    println!();
    println!("  Documents:   {}", documents);
    println!("  Records:     {}", records);
    println!();

    Ok(())
}

/// Database file plus its WAL and shared-memory side files.
fn store_size(path: &std::path::Path) -> u64 {
    let mut total = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        total += std::fs::metadata(&side).map(|m| m.len()).unwrap_or(0);
    }
    total
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
