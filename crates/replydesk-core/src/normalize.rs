//! Corpus normalizer.
//!
//! Turns a raw text dump of past support replies into [`TemplateRecord`]s.
//! Replies are separated by a run of repeated marker characters
//! (`**********` by default). Each surviving block becomes one record whose
//! `reply` is the trimmed block and whose `topic` is the block with
//! greeting, sign-off, and decorative lines stripped.
//!
//! Blocks shorter than [`NormalizeOptions::min_block_chars`] are separator
//! artifacts or empty trailing sections and are dropped. A block made only of
//! boilerplate keeps its record with an empty topic.

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::models::{KnowledgeBase, TemplateRecord};

/// Tuning knobs for [`CorpusNormalizer`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Character whose repeated run separates replies.
    pub separator_char: char,
    /// Minimum run length that counts as a separator.
    pub separator_min_run: usize,
    /// Blocks with fewer trimmed characters than this are discarded.
    pub min_block_chars: usize,
    /// Lines containing any of these substrings are left out of the topic.
    pub boilerplate: Vec<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            separator_char: '*',
            separator_min_run: 10,
            min_block_chars: 10,
            boilerplate: vec![
                "Dear User".to_string(),
                "Thanks,".to_string(),
                "Qoneqt Support Team".to_string(),
            ],
        }
    }
}

/// Splits a raw corpus into template records.
#[derive(Debug, Clone)]
pub struct CorpusNormalizer {
    separator: Regex,
    options: NormalizeOptions,
}

impl CorpusNormalizer {
    /// Build a normalizer, compiling the separator pattern.
    ///
    /// # Errors
    ///
    /// Fails when `separator_min_run` is zero or the separator is
    /// whitespace (either would split every block apart).
    pub fn new(options: NormalizeOptions) -> Result<Self> {
        if options.separator_min_run == 0 {
            bail!("separator_min_run must be > 0");
        }
        if options.separator_char.is_whitespace() {
            bail!("separator_char must not be whitespace");
        }
        let pattern = format!(
            "{}{{{},}}",
            regex::escape(&options.separator_char.to_string()),
            options.separator_min_run
        );
        let separator = Regex::new(&pattern)
            .with_context(|| format!("Invalid separator pattern: {}", pattern))?;
        Ok(Self { separator, options })
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Split `raw` into records, in corpus order.
    pub fn normalize(&self, raw: &str) -> KnowledgeBase {
        self.separator
            .split(raw)
            .map(str::trim)
            .filter(|block| block.chars().count() >= self.options.min_block_chars)
            .map(|block| TemplateRecord {
                topic: self.extract_topic(block),
                reply: block.to_string(),
            })
            .collect()
    }

    /// Derive the search topic of a single block.
    ///
    /// Returns an empty string when every line is boilerplate.
    pub fn extract_topic(&self, block: &str) -> String {
        block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !self.is_boilerplate(line))
            .filter(|line| !is_decorative(line))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn is_boilerplate(&self, line: &str) -> bool {
        self.options
            .boilerplate
            .iter()
            .any(|marker| !marker.is_empty() && line.contains(marker.as_str()))
    }
}

/// A line with no letters or digits at all (`***`, `-----`, `==`).
fn is_decorative(line: &str) -> bool {
    !line.chars().any(char::is_alphanumeric)
}
