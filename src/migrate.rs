use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index tables. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Single-row table describing the stored index
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            kb_digest TEXT NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per template, in knowledge-base order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            position INTEGER PRIMARY KEY,
            topic TEXT NOT NULL,
            reply TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
