//! In-memory [`RecordStore`] implementation for tests and library embedders.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Similarity search is brute-force
//! cosine similarity over all stored vectors.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    EmbeddingRecord, Entity, IncidentRecord, NewEmbedding, NewIncident, SearchMatch,
};

use super::{product_matches, rank_matches, score_against, RecordStore, SimilarityQuery};

#[derive(Default)]
struct Tables {
    incidents: Vec<IncidentRecord>,
    embeddings: Vec<EmbeddingRecord>,
    next_id: i64,
}

impl Tables {
    fn insert_incident(&mut self, incident: &NewIncident) -> Result<i64> {
        if self
            .incidents
            .iter()
            .any(|i| i.incident_number == incident.incident_number)
        {
            bail!(
                "UNIQUE constraint failed: incidents.incident_number ({})",
                incident.incident_number
            );
        }
        self.next_id += 1;
        let id = self.next_id;
        self.incidents.push(IncidentRecord::from_new(id, incident));
        Ok(id)
    }

    fn insert_embedding(&mut self, incident_id: i64, embedding: &NewEmbedding) -> Result<()> {
        if !self.incidents.iter().any(|i| i.id == incident_id) {
            bail!("FOREIGN KEY constraint failed: no incident with id {}", incident_id);
        }
        self.embeddings.push(EmbeddingRecord {
            incident_id,
            content_type: embedding.content_type,
            content_text: embedding.content_text.clone(),
            vector: embedding.vector.clone(),
        });
        Ok(())
    }
}

/// In-memory record store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored embedding, in insertion order.
    pub fn embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        Ok(self.read()?.embeddings.clone())
    }

    /// Look up a stored incident by its natural key.
    pub fn incident(&self, incident_number: &str) -> Result<Option<IncidentRecord>> {
        Ok(self
            .read()?
            .incidents
            .iter()
            .find(|i| i.incident_number == incident_number)
            .cloned())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn exists(&self, incident_number: &str) -> Result<bool> {
        Ok(self
            .read()?
            .incidents
            .iter()
            .any(|i| i.incident_number == incident_number))
    }

    async fn insert_incident(&self, incident: &NewIncident) -> Result<i64> {
        self.write()?.insert_incident(incident)
    }

    async fn insert_embedding(&self, incident_id: i64, embedding: &NewEmbedding) -> Result<()> {
        self.write()?.insert_embedding(incident_id, embedding)
    }

    async fn persist_incident(
        &self,
        incident: &NewIncident,
        embeddings: &[NewEmbedding],
    ) -> Result<i64> {
        // Single write guard: nothing is visible until everything is stored.
        let mut tables = self.write()?;
        let id = tables.insert_incident(incident)?;
        for embedding in embeddings {
            tables.insert_embedding(id, embedding)?;
        }
        Ok(id)
    }

    async fn similarity_search(&self, query: &SimilarityQuery<'_>) -> Result<Vec<SearchMatch>> {
        let tables = self.read()?;
        let mut matches = Vec::new();

        for embedding in &tables.embeddings {
            if let Some(ct) = query.content_type {
                if embedding.content_type != ct {
                    continue;
                }
            }
            let Some(incident) = tables
                .incidents
                .iter()
                .find(|i| i.id == embedding.incident_id)
            else {
                continue;
            };
            if !product_matches(&incident.product, query.product_filter) {
                continue;
            }
            let Some(similarity) = score_against(query, &embedding.vector) else {
                continue;
            };
            matches.push(SearchMatch {
                incident: incident.clone(),
                similarity_score: similarity,
                content_type: embedding.content_type,
            });
        }

        Ok(rank_matches(matches, query.limit))
    }

    async fn count(&self, entity: Entity) -> Result<i64> {
        let tables = self.read()?;
        Ok(match entity {
            Entity::Incidents => tables.incidents.len() as i64,
            Entity::Embeddings => tables.embeddings.len() as i64,
        })
    }

    async fn incidents_created_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncidentRecord>> {
        let mut found: Vec<IncidentRecord> = self
            .read()?
            .incidents
            .iter()
            .filter(|i| matches!(i.created_on, Some(d) if d >= from && d <= to))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_on.cmp(&a.created_on).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}
