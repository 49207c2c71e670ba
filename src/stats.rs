//! Record store statistics.
//!
//! [`collect_stats`] backs `GET /api/db/stats`; [`run_stats`] prints a
//! fuller overview for `irag stats`, including a per-aspect breakdown and
//! incidents still waiting for embeddings.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::models::Entity;
use crate::store::sqlite::SqliteStore;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub incidents: i64,
    pub embeddings: i64,
}

pub async fn collect_stats(store: &dyn RecordStore) -> Result<StoreStats> {
    Ok(StoreStats {
        incidents: store.count(Entity::Incidents).await?,
        embeddings: store.count(Entity::Embeddings).await?,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let stats = collect_stats(&store).await?;

    let without_embeddings: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM incidents i
        WHERE NOT EXISTS (SELECT 1 FROM incident_embeddings e WHERE e.incident_id = i.id)
        "#,
    )
    .fetch_one(&pool)
    .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("incident-rag database stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Incidents:   {}", stats.incidents);
    println!("  Embeddings:  {}", stats.embeddings);
    println!("  Unembedded:  {}", without_embeddings);

    let aspect_rows = sqlx::query(
        r#"
        SELECT content_type, COUNT(*) AS n
        FROM incident_embeddings
        GROUP BY content_type
        ORDER BY content_type
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !aspect_rows.is_empty() {
        println!();
        println!("  By aspect:");
        for row in &aspect_rows {
            let content_type: String = row.get("content_type");
            let n: i64 = row.get("n");
            println!("  {:<14} {:>8}", content_type, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
