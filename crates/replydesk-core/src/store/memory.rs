//! In-memory [`IndexStore`] implementation for testing.
//!
//! Holds at most one index behind a `std::sync::RwLock`.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::index::RetrievalIndex;

use super::IndexStore;

/// In-memory index store.
#[derive(Default)]
pub struct InMemoryIndexStore {
    slot: RwLock<Option<RetrievalIndex>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn save(&self, index: &RetrievalIndex) -> Result<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| anyhow!("index store lock poisoned"))?;
        *slot = Some(index.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<RetrievalIndex>> {
        let slot = self
            .slot
            .read()
            .map_err(|_| anyhow!("index store lock poisoned"))?;
        Ok(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexEntry, IndexMeta};
    use crate::models::TemplateRecord;

    fn index(topic: &str) -> RetrievalIndex {
        let meta = IndexMeta {
            model: "m".into(),
            dims: 1,
            kb_digest: topic.into(),
            built_at: 0,
        };
        RetrievalIndex::from_parts(
            meta,
            vec![IndexEntry {
                record: TemplateRecord {
                    topic: topic.into(),
                    reply: "reply text".into(),
                },
                vector: vec![1.0],
            }],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_before_save_is_none() {
        let store = InMemoryIndexStore::new();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_wholesale() {
        let store = InMemoryIndexStore::new();
        store.save(&index("first")).await.unwrap();
        store.save(&index("second")).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].record.topic, "second");
    }
}
