//! `replydesk index build` / `replydesk index info`.

use anyhow::{bail, Result};

use replydesk_core::index::RetrievalIndex;
use replydesk_core::store::IndexStore;

use crate::config::Config;
use crate::embedding;
use crate::knowledge_base;
use crate::sqlite_store::SqliteIndexStore;

/// Embed the knowledge base and replace the persisted index wholesale.
pub async fn run_index_build(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let kb = knowledge_base::load(&config.paths.knowledge_base)?;
    let provider = embedding::create_provider(&config.embedding)?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    tracing::info!(
        templates = kb.len(),
        model = provider.model_name(),
        "building retrieval index"
    );
    let index = RetrievalIndex::build(provider.as_ref(), &kb, batch_size).await?;

    let store = SqliteIndexStore::open(&config.paths.index).await?;
    store.save(&index).await?;
    store.close().await;

    println!("index build");
    println!("  templates: {}", index.len());
    println!("  model: {}", index.meta().model);
    println!("  dims: {}", index.meta().dims);
    println!("  saved: {}", config.paths.index.display());

    Ok(())
}

/// Print persisted index metadata and whether it still matches the knowledge base.
pub async fn run_index_info(config: &Config) -> Result<()> {
    if !config.paths.index.exists() {
        println!("index info");
        println!("  no index at {} (run `replydesk index build`)", config.paths.index.display());
        return Ok(());
    }

    let store = SqliteIndexStore::open(&config.paths.index).await?;
    let loaded = store.load().await?;
    store.close().await;

    let Some(index) = loaded else {
        println!("index info");
        println!("  index database is empty (run `replydesk index build`)");
        return Ok(());
    };

    let meta = index.meta();
    let built_at = chrono::DateTime::from_timestamp(meta.built_at, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| meta.built_at.to_string());

    let freshness = match knowledge_base::load(&config.paths.knowledge_base) {
        Ok(kb) if index.is_stale(&kb) => "stale (knowledge base changed since build)".to_string(),
        Ok(_) => "up to date".to_string(),
        Err(e) => format!("unknown ({})", e),
    };

    println!("index info");
    println!("  templates: {}", index.len());
    println!("  model: {}", meta.model);
    println!("  dims: {}", meta.dims);
    println!("  kb digest: {}", meta.kb_digest);
    println!("  built at: {}", built_at);
    println!("  status: {}", freshness);

    Ok(())
}
