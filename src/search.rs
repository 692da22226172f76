//! `replydesk search`: query the retrieval index from the command line.

use anyhow::{bail, Context, Result};

use replydesk_core::store::IndexStore;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteIndexStore;

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);

    if !config.paths.index.exists() {
        bail!(
            "No retrieval index at {}. Run `replydesk index build` first.",
            config.paths.index.display()
        );
    }

    let store = SqliteIndexStore::open(&config.paths.index).await?;
    let loaded = store.load().await;
    store.close().await;
    let index = loaded?.context("Retrieval index is empty. Run `replydesk index build` first.")?;

    let provider = embedding::create_provider(&config.embedding)?;
    let hits = index.query_scored(provider.as_ref(), query, k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.2}] template #{}",
            i + 1,
            hit.score,
            hit.position
        );
        if hit.record.topic.is_empty() {
            println!("    topic: (empty)");
        } else {
            println!("    topic: {}", hit.record.topic);
        }
        for line in hit.record.reply.lines() {
            println!("    | {}", line);
        }
        println!();
    }

    Ok(())
}
