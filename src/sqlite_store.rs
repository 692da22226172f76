//! SQLite-backed [`IndexStore`] implementation.
//!
//! The index lives in two tables: `index_meta` (one row) and `templates`
//! (one row per record with its embedding as a little-endian f32 BLOB).
//! [`save`](IndexStore::save) rewrites both inside a single transaction, so
//! readers see either the previous index or the new one.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use replydesk_core::embedding::{blob_to_vec, vec_to_blob};
use replydesk_core::index::{IndexEntry, IndexMeta, RetrievalIndex};
use replydesk_core::models::TemplateRecord;
use replydesk_core::store::IndexStore;

use crate::{db, migrate};

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn save(&self, index: &RetrievalIndex) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM templates")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await?;

        let meta = index.meta();
        sqlx::query(
            "INSERT INTO index_meta (id, model, dims, kb_digest, built_at) VALUES (1, ?, ?, ?, ?)",
        )
        .bind(&meta.model)
        .bind(meta.dims as i64)
        .bind(&meta.kb_digest)
        .bind(meta.built_at)
        .execute(&mut *tx)
        .await?;

        for (position, entry) in index.entries().iter().enumerate() {
            sqlx::query(
                "INSERT INTO templates (position, topic, reply, vector) VALUES (?, ?, ?, ?)",
            )
            .bind(position as i64)
            .bind(&entry.record.topic)
            .bind(&entry.record.reply)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<RetrievalIndex>> {
        let meta_row =
            sqlx::query("SELECT model, dims, kb_digest, built_at FROM index_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        let Some(meta_row) = meta_row else {
            return Ok(None);
        };

        let meta = IndexMeta {
            model: meta_row.get("model"),
            dims: meta_row.get::<i64, _>("dims") as usize,
            kb_digest: meta_row.get("kb_digest"),
            built_at: meta_row.get("built_at"),
        };

        let rows = sqlx::query("SELECT topic, reply, vector FROM templates ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                IndexEntry {
                    record: TemplateRecord {
                        topic: row.get("topic"),
                        reply: row.get("reply"),
                    },
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(Some(RetrievalIndex::from_parts(meta, entries)?))
    }
}
