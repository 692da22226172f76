//! Retrieval index over the knowledge base.
//!
//! The index holds one embedding per [`TemplateRecord`], computed from the
//! record's composite text (`"Topic: …\nFull Template: …"`), and answers
//! nearest-neighbor queries by brute-force cosine similarity. Support
//! knowledge bases are small (tens to low thousands of templates), so an
//! exact scan is fast enough and keeps ranking deterministic.
//!
//! # Invariants
//!
//! - Built wholesale from one knowledge-base snapshot; never updated in
//!   place. [`IndexMeta::kb_digest`] identifies that snapshot.
//! - Queries must use the embedding model the index was built with. A
//!   different model name or vector dimension fails with
//!   [`IndexError::EmbeddingMismatch`] / [`IndexError::DimensionMismatch`].
//! - Equal scores keep insertion order.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::embedding::{cosine_similarity, embed_one, EmbeddingProvider};
use crate::models::TemplateRecord;

/// Retrieval failures. Callers in the mailbox loop treat all of these as
/// "no context available".
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("retrieval index is unavailable (run `replydesk index build`)")]
    Unavailable,
    #[error("embedding model mismatch: index built with '{expected}', provider is '{actual}'")]
    EmbeddingMismatch { expected: String, actual: String },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("k must be >= 1")]
    InvalidK,
    #[error("embedding failed: {0}")]
    Embedding(String),
}

/// Metadata describing how and from what an index was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMeta {
    /// Embedding model identifier reported by the provider at build time.
    pub model: String,
    /// Vector dimensionality.
    pub dims: usize,
    /// SHA-256 of the knowledge base the index was built from.
    pub kb_digest: String,
    /// Build time (unix seconds).
    pub built_at: i64,
}

/// One indexed template and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub record: TemplateRecord,
    pub vector: Vec<f32>,
}

/// A query hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTemplate {
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    /// Insertion position in the index.
    pub position: usize,
    pub record: TemplateRecord,
}

/// Read-only nearest-neighbor index over template records.
#[derive(Debug, Clone)]
pub struct RetrievalIndex {
    meta: IndexMeta,
    entries: Vec<IndexEntry>,
}

impl RetrievalIndex {
    /// Embed every record of `kb` and build an index.
    ///
    /// Records are embedded in batches of `batch_size` (at least 1).
    pub async fn build(
        provider: &dyn EmbeddingProvider,
        kb: &[TemplateRecord],
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let batch_size = batch_size.max(1);
        let mut entries = Vec::with_capacity(kb.len());

        for batch in kb.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(TemplateRecord::composite_text).collect();
            let vectors = provider
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (record, vector) in batch.iter().zip(vectors) {
                entries.push(IndexEntry {
                    record: record.clone(),
                    vector,
                });
            }
        }

        let dims = entries
            .first()
            .map(|e| e.vector.len())
            .unwrap_or_else(|| provider.dims());

        let meta = IndexMeta {
            model: provider.model_name().to_string(),
            dims,
            kb_digest: knowledge_base_digest(kb),
            built_at: chrono::Utc::now().timestamp(),
        };

        if provider.dims() != 0 && provider.dims() != dims {
            return Err(IndexError::DimensionMismatch {
                expected: provider.dims(),
                actual: dims,
            });
        }

        Self::from_parts(meta, entries)
    }

    /// Reassemble an index from persisted parts, validating dimensions.
    pub fn from_parts(meta: IndexMeta, entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != meta.dims) {
            return Err(IndexError::DimensionMismatch {
                expected: meta.dims,
                actual: bad.vector.len(),
            });
        }
        Ok(Self { meta, entries })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `kb` differs from the knowledge base this index was built from.
    pub fn is_stale(&self, kb: &[TemplateRecord]) -> bool {
        self.meta.kb_digest != knowledge_base_digest(kb)
    }

    /// Return the `k` records most similar to `text`, best first.
    pub async fn query(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
        k: usize,
    ) -> Result<Vec<TemplateRecord>, IndexError> {
        let hits = self.query_scored(provider, text, k).await?;
        Ok(hits.into_iter().map(|h| h.record).collect())
    }

    /// Like [`query`](Self::query) but keeps scores and positions.
    pub async fn query_scored(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredTemplate>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        self.check_provider(provider)?;
        if text.trim().is_empty() || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(provider, text)
            .await
            .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;
        if query_vec.len() != self.meta.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.meta.dims,
                actual: query_vec.len(),
            });
        }

        Ok(self.nearest(&query_vec, k))
    }

    /// Rank all entries against a pre-computed query vector.
    pub fn nearest(&self, query_vec: &[f32], k: usize) -> Vec<ScoredTemplate> {
        let mut hits: Vec<ScoredTemplate> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| ScoredTemplate {
                score: cosine_similarity(query_vec, &entry.vector),
                position,
                record: entry.record.clone(),
            })
            .collect();
        // Stable sort: equal scores stay in insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }

    fn check_provider(&self, provider: &dyn EmbeddingProvider) -> Result<(), IndexError> {
        if provider.model_name() != self.meta.model {
            return Err(IndexError::EmbeddingMismatch {
                expected: self.meta.model.clone(),
                actual: provider.model_name().to_string(),
            });
        }
        if provider.dims() != 0 && provider.dims() != self.meta.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.meta.dims,
                actual: provider.dims(),
            });
        }
        Ok(())
    }
}

/// SHA-256 over every record's topic and reply, in order.
pub fn knowledge_base_digest(kb: &[TemplateRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in kb {
        hasher.update(record.topic.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.reply.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Bag-of-words embedder over a fixed vocabulary.
    struct VocabProvider {
        name: &'static str,
        vocab: Vec<&'static str>,
    }

    impl VocabProvider {
        fn new() -> Self {
            Self {
                name: "vocab",
                vocab: vec!["payment", "refund", "kyc", "password", "delayed", "bank"],
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for VocabProvider {
        fn model_name(&self) -> &str {
            self.name
        }
        fn dims(&self) -> usize {
            self.vocab.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    self.vocab
                        .iter()
                        .map(|w| lower.matches(w).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn kb() -> Vec<TemplateRecord> {
        vec![
            TemplateRecord {
                topic: "Payment delayed by bank".into(),
                reply: "Dear User,\nYour payment was delayed by the bank.\nThanks,".into(),
            },
            TemplateRecord {
                topic: "Refund processed".into(),
                reply: "Dear User,\nYour refund is on the way.\nThanks,".into(),
            },
            TemplateRecord {
                topic: "KYC pending".into(),
                reply: "Dear User,\nYour KYC is under review.\nThanks,".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_self_retrieval() {
        let provider = VocabProvider::new();
        let kb = kb();
        let index = RetrievalIndex::build(&provider, &kb, 2).await.unwrap();
        assert_eq!(index.len(), 3);
        for record in &kb {
            let hits = index.query(&provider, &record.reply, 2).await.unwrap();
            assert!(hits.contains(record), "{} not retrieved", record.topic);
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let provider = VocabProvider::new();
        let index = RetrievalIndex::build(&provider, &kb(), 8).await.unwrap();
        let hits = index
            .query_scored(&provider, "my refund never came", 3)
            .await
            .unwrap();
        assert_eq!(hits[0].record.topic, "Refund processed");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_k_bounds_result_length() {
        let provider = VocabProvider::new();
        let index = RetrievalIndex::build(&provider, &kb(), 8).await.unwrap();
        assert_eq!(index.query(&provider, "payment", 1).await.unwrap().len(), 1);
        assert_eq!(index.query(&provider, "payment", 10).await.unwrap().len(), 3);
        assert!(matches!(
            index.query(&provider, "payment", 0).await,
            Err(IndexError::InvalidK)
        ));
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let provider = VocabProvider::new();
        let index = RetrievalIndex::build(&provider, &kb(), 8).await.unwrap();
        // No vocabulary overlap: every score is 0.0.
        let hits = index.query_scored(&provider, "hello there", 3).await.unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let provider = VocabProvider::new();
        let index = RetrievalIndex::build(&provider, &kb(), 8).await.unwrap();
        let other = VocabProvider {
            name: "other-model",
            ..VocabProvider::new()
        };
        let err = index.query(&other, "payment", 2).await.unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingMismatch { .. }));
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let provider = VocabProvider::new();
        let index = RetrievalIndex::build(&provider, &kb(), 8).await.unwrap();
        assert!(index.query(&provider, "   ", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staleness_tracks_kb() {
        let provider = VocabProvider::new();
        let mut records = kb();
        let index = RetrievalIndex::build(&provider, &records, 8).await.unwrap();
        assert!(!index.is_stale(&records));
        records.pop();
        assert!(index.is_stale(&records));
    }

    #[test]
    fn test_from_parts_rejects_ragged_vectors() {
        let meta = IndexMeta {
            model: "m".into(),
            dims: 2,
            kb_digest: String::new(),
            built_at: 0,
        };
        let entries = vec![IndexEntry {
            record: TemplateRecord {
                topic: "t".into(),
                reply: "r".into(),
            },
            vector: vec![1.0, 2.0, 3.0],
        }];
        assert!(matches!(
            RetrievalIndex::from_parts(meta, entries),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let mut records = kb();
        let a = knowledge_base_digest(&records);
        records.swap(0, 1);
        assert_ne!(a, knowledge_base_digest(&records));
    }
}
