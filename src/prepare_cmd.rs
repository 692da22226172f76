//! `replydesk prepare`: raw corpus → knowledge-base JSON.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use replydesk_core::normalize::CorpusNormalizer;

use crate::config::Config;
use crate::knowledge_base;

pub fn run_prepare(config: &Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input = input.unwrap_or_else(|| config.paths.corpus.clone());
    let output = output.unwrap_or_else(|| config.paths.knowledge_base.clone());

    if !input.exists() {
        bail!(
            "Corpus file '{}' not found. Paste the canned replies into it, separated by lines of {} or more '{}'.",
            input.display(),
            config.corpus.separator_min_run,
            config.corpus.separator_char
        );
    }

    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read corpus {}", input.display()))?;

    let normalizer = CorpusNormalizer::new(config.corpus.normalize_options())?;
    let kb = normalizer.normalize(&raw);
    let empty_topics = kb.iter().filter(|r| r.topic.is_empty()).count();

    knowledge_base::save(&output, &kb)?;

    println!("prepare");
    println!("  input: {}", input.display());
    println!("  templates: {}", kb.len());
    if empty_topics > 0 {
        println!("  templates with empty topic: {}", empty_topics);
    }
    println!("  saved: {}", output.display());

    Ok(())
}
