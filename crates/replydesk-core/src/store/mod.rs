//! Storage abstraction for the retrieval index.
//!
//! The [`IndexStore`] trait persists and restores a whole
//! [`RetrievalIndex`]. There is no incremental update: `save` replaces
//! whatever was stored before, which is what keeps the persisted index in
//! lock-step with a single knowledge-base snapshot.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::RetrievalIndex;

/// Abstract storage backend for a built retrieval index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save`](IndexStore::save) | Replace the stored index wholesale |
/// | [`load`](IndexStore::load) | Restore the stored index, if one exists |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Persist `index`, discarding any previously stored index.
    async fn save(&self, index: &RetrievalIndex) -> Result<()>;

    /// Load the stored index. Returns `Ok(None)` when nothing was built yet.
    async fn load(&self) -> Result<Option<RetrievalIndex>>;
}
