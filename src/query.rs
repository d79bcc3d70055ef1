//! `docmem query`: semantic lookup over stored chunks.

use anyhow::Result;

use crate::config::Config;
use crate::services::Services;
use crate::store::query_similar;

/// Characters of chunk text shown per match.
const EXCERPT_CHARS: usize = 240;

pub async fn run_query(config: &Config, text: &str, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    if top_k == 0 {
        anyhow::bail!("--top-k must be >= 1");
    }
    if text.trim().is_empty() {
        anyhow::bail!("query text must not be empty");
    }

    let services = Services::init(config.clone()).await?;
    let result = query_similar(
        services.embedder.as_ref(),
        services.store.as_ref(),
        text,
        top_k,
    )
    .await;
    services.shutdown().await?;
    let matches = result?;

    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        println!(
            "{}. [distance {:.4}] doc={} at={}",
            i + 1,
            m.distance,
            m.document_id,
            m.timestamp
        );
        println!("   {}", excerpt(&m.chunk_text));
    }
    Ok(())
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut)
}
