//! Idempotent schema setup for the incident tables.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // incident_number UNIQUE is the store-level dedup guarantee; the
    // ingestion existence check is only a fast path.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS incidents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            incident_number TEXT NOT NULL UNIQUE,
            product TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            closing_notes TEXT,
            resolution_tier_1 TEXT,
            resolution_tier_2 TEXT,
            resolution_tier_3 TEXT,
            problem_id TEXT,
            created_on TEXT,
            created_by TEXT,
            priority INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS incident_embeddings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            incident_id INTEGER NOT NULL,
            content_type TEXT NOT NULL
                CHECK (content_type IN ('description', 'resolution', 'combined')),
            content_text TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (incident_id) REFERENCES incidents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_incident_id ON incident_embeddings(incident_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_content_type ON incident_embeddings(content_type)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_incidents_created_on ON incidents(created_on DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
