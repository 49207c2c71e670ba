//! Storage abstraction for incident records and their aspect embeddings.
//!
//! The [`RecordStore`] trait defines every storage operation the ingestion,
//! search, and summary paths need, so the core can run against SQLite
//! ([`sqlite::SqliteStore`]) or memory ([`memory::InMemoryStore`]).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::embedding::cosine_similarity;
use crate::models::{ContentType, Entity, IncidentRecord, NewEmbedding, NewIncident, SearchMatch};

/// Parameters for [`RecordStore::similarity_search`].
///
/// Every filter is optional and only ever narrows the match set.
#[derive(Debug, Clone)]
pub struct SimilarityQuery<'a> {
    pub vector: &'a [f32],
    pub content_type: Option<ContentType>,
    pub product_filter: Option<&'a str>,
    /// Minimum cosine similarity in `[0, 1]`.
    pub threshold: f64,
    pub limit: i64,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists`](RecordStore::exists) | Dedup gate by `incident_number` |
/// | [`insert_incident`](RecordStore::insert_incident) | Insert one incident, returning its id |
/// | [`insert_embedding`](RecordStore::insert_embedding) | Attach one aspect embedding |
/// | [`persist_incident`](RecordStore::persist_incident) | Incident + embeddings as one unit |
/// | [`similarity_search`](RecordStore::similarity_search) | Ranked, filtered vector search |
/// | [`count`](RecordStore::count) | Entity counts |
/// | [`incidents_created_between`](RecordStore::incidents_created_between) | Creation-date window |
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn exists(&self, incident_number: &str) -> Result<bool>;

    /// Insert an incident. Fails if `incident_number` is already stored.
    async fn insert_incident(&self, incident: &NewIncident) -> Result<i64>;

    async fn insert_embedding(&self, incident_id: i64, embedding: &NewEmbedding) -> Result<()>;

    /// Insert an incident together with its embeddings.
    ///
    /// Backends with transactions override this so that either the incident
    /// and all of `embeddings` are written, or nothing is. An empty
    /// `embeddings` slice is valid and stores the bare incident.
    async fn persist_incident(
        &self,
        incident: &NewIncident,
        embeddings: &[NewEmbedding],
    ) -> Result<i64> {
        let id = self.insert_incident(incident).await?;
        for embedding in embeddings {
            self.insert_embedding(id, embedding).await?;
        }
        Ok(id)
    }

    /// Return matches with `similarity >= threshold`, best first, at most `limit`.
    ///
    /// One match per stored embedding, so an incident may appear once per
    /// matching content type.
    async fn similarity_search(&self, query: &SimilarityQuery<'_>) -> Result<Vec<SearchMatch>>;

    async fn count(&self, entity: Entity) -> Result<i64>;

    /// Incidents whose creation date lies in `[from, to]`, newest first.
    async fn incidents_created_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncidentRecord>>;
}

/// Case-insensitive substring match used for `product_filter`.
pub(crate) fn product_matches(product: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(f) if !f.trim().is_empty() => product
            .to_lowercase()
            .contains(&f.trim().to_lowercase()),
        _ => true,
    }
}

/// Slack for f32 rounding, so an exact match still passes `threshold = 1.0`.
const SCORE_EPSILON: f64 = 1e-6;

/// Score a stored vector against the query.
///
/// Returns `None` when the dimensions differ or the similarity falls below
/// the threshold. Scores are clamped to `[0, 1]`.
pub(crate) fn score_against(query: &SimilarityQuery<'_>, stored: &[f32]) -> Option<f64> {
    if stored.len() != query.vector.len() {
        return None;
    }
    let similarity = f64::from(cosine_similarity(query.vector, stored));
    if similarity + SCORE_EPSILON < query.threshold {
        return None;
    }
    Some(similarity.clamp(0.0, 1.0))
}

/// Sort best-first and truncate.
pub(crate) fn rank_matches(mut matches: Vec<SearchMatch>, limit: i64) -> Vec<SearchMatch> {
    matches.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit.max(0) as usize);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_filter_is_case_insensitive_substring() {
        assert!(product_matches("Billing Portal", Some("billing")));
        assert!(product_matches("Billing Portal", None));
        assert!(product_matches("Billing Portal", Some("  ")));
        assert!(!product_matches("Billing Portal", Some("payroll")));
    }

    fn query(vector: &[f32], threshold: f64) -> SimilarityQuery<'_> {
        SimilarityQuery {
            vector,
            content_type: None,
            product_filter: None,
            threshold,
            limit: 10,
        }
    }

    #[test]
    fn test_exact_match_passes_full_threshold() {
        let v = [0.1f32, 0.2, 0.3, 0.7];
        let score = score_against(&query(&v, 1.0), &v).unwrap();
        assert!(score <= 1.0);
        assert!(score > 0.999);
    }

    #[test]
    fn test_score_rejects_other_dimensions() {
        assert_eq!(score_against(&query(&[1.0, 0.0, 0.0], 0.0), &[1.0, 0.0]), None);
    }

    #[test]
    fn test_score_is_clamped_and_thresholded() {
        assert_eq!(score_against(&query(&[1.0, 0.0], 0.5), &[0.0, 1.0]), None);
        assert_eq!(score_against(&query(&[1.0, 0.0], 0.5), &[-1.0, 0.0]), None);
        let score = score_against(&query(&[1.0, 0.0], 0.0), &[1.0, 1.0]).unwrap();
        assert!((score - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }
}
