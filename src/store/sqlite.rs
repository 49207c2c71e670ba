//! SQLite-backed [`RecordStore`] implementation.
//!
//! Incidents live in `incidents`, aspect vectors in `incident_embeddings`
//! as little-endian f32 BLOBs. Similarity is cosine similarity computed in
//! process over the rows that survive the SQL-side filters.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{
    ContentType, Entity, IncidentRecord, NewEmbedding, NewIncident, SearchMatch,
};

use super::{product_matches, rank_matches, score_against, RecordStore, SimilarityQuery};

const DATE_FORMAT: &str = "%Y-%m-%d";

const INCIDENT_COLUMNS: &str = "i.id AS id, i.incident_number AS incident_number, \
    i.product AS product, i.description AS description, i.closing_notes AS closing_notes, \
    i.resolution_tier_1 AS resolution_tier_1, i.resolution_tier_2 AS resolution_tier_2, \
    i.resolution_tier_3 AS resolution_tier_3, i.problem_id AS problem_id, \
    i.created_on AS created_on, i.created_by AS created_by, i.priority AS priority";

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn incident_from_row(row: &SqliteRow) -> IncidentRecord {
    let created_on: Option<String> = row.get("created_on");
    IncidentRecord {
        id: row.get("id"),
        incident_number: row.get("incident_number"),
        product: row.get("product"),
        description: row.get("description"),
        closing_notes: row.get("closing_notes"),
        resolution_tier_1: row.get("resolution_tier_1"),
        resolution_tier_2: row.get("resolution_tier_2"),
        resolution_tier_3: row.get("resolution_tier_3"),
        problem_id: row.get("problem_id"),
        created_on: created_on.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        created_by: row.get("created_by"),
        priority: row.get("priority"),
    }
}

async fn insert_incident_in<'e, E>(executor: E, incident: &NewIncident) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO incidents (incident_number, product, description, closing_notes,
                               resolution_tier_1, resolution_tier_2, resolution_tier_3,
                               problem_id, created_on, created_by, priority)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&incident.incident_number)
    .bind(&incident.product)
    .bind(&incident.description)
    .bind(&incident.closing_notes)
    .bind(&incident.resolution_tier_1)
    .bind(&incident.resolution_tier_2)
    .bind(&incident.resolution_tier_3)
    .bind(&incident.problem_id)
    .bind(incident.created_on.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(&incident.created_by)
    .bind(incident.priority)
    .execute(executor)
    .await
    .with_context(|| format!("Failed to insert incident {}", incident.incident_number))?;

    Ok(result.last_insert_rowid())
}

async fn insert_embedding_in<'e, E>(
    executor: E,
    incident_id: i64,
    embedding: &NewEmbedding,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO incident_embeddings (incident_id, content_type, content_text, dims, embedding)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(incident_id)
    .bind(embedding.content_type.as_str())
    .bind(&embedding.content_text)
    .bind(embedding.vector.len() as i64)
    .bind(vec_to_blob(&embedding.vector))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn exists(&self, incident_number: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM incidents WHERE incident_number = ?")
                .bind(incident_number)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert_incident(&self, incident: &NewIncident) -> Result<i64> {
        insert_incident_in(&self.pool, incident).await
    }

    async fn insert_embedding(&self, incident_id: i64, embedding: &NewEmbedding) -> Result<()> {
        insert_embedding_in(&self.pool, incident_id, embedding).await
    }

    async fn persist_incident(
        &self,
        incident: &NewIncident,
        embeddings: &[NewEmbedding],
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_incident_in(&mut *tx, incident).await?;
        for embedding in embeddings {
            insert_embedding_in(&mut *tx, id, embedding).await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    async fn similarity_search(&self, query: &SimilarityQuery<'_>) -> Result<Vec<SearchMatch>> {
        let sql = format!(
            r#"
            SELECT {INCIDENT_COLUMNS}, e.content_type AS content_type, e.embedding AS embedding
            FROM incident_embeddings e
            JOIN incidents i ON i.id = e.incident_id
            WHERE (?1 IS NULL OR e.content_type = ?1)
              AND e.dims = ?2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(query.content_type.map(|ct| ct.as_str()))
            .bind(query.vector.len() as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::new();
        for row in &rows {
            let product: String = row.get("product");
            if !product_matches(&product, query.product_filter) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            let Some(similarity) = score_against(query, &blob_to_vec(&blob)) else {
                continue;
            };
            let content_type: String = row.get("content_type");
            matches.push(SearchMatch {
                incident: incident_from_row(row),
                similarity_score: similarity,
                content_type: content_type.parse::<ContentType>()?,
            });
        }

        Ok(rank_matches(matches, query.limit))
    }

    async fn count(&self, entity: Entity) -> Result<i64> {
        let sql = match entity {
            Entity::Incidents => "SELECT COUNT(*) FROM incidents",
            Entity::Embeddings => "SELECT COUNT(*) FROM incident_embeddings",
        };
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn incidents_created_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncidentRecord>> {
        let sql = format!(
            r#"
            SELECT {INCIDENT_COLUMNS}
            FROM incidents i
            WHERE i.created_on >= ? AND i.created_on <= ?
            ORDER BY i.created_on DESC, i.id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(from.format(DATE_FORMAT).to_string())
            .bind(to.format(DATE_FORMAT).to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(incident_from_row).collect())
    }
}
