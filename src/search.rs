//! Similarity search over incident aspect embeddings.
//!
//! The query is embedded with the configured provider and handed to the
//! record store, which owns ranking. This module adds the fail-soft
//! boundary (any failure degrades to "no results") and the plain-text
//! report used for prompt construction downstream.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding::{self, embed_or_none, EmbeddingProvider};
use crate::models::{ContentType, SearchMatch};
use crate::store::sqlite::SqliteStore;
use crate::store::{RecordStore, SimilarityQuery};

/// Number of description characters quoted per report line.
const REPORT_SNIPPET_CHARS: usize = 100;

/// Inputs to [`search`]. Filters are optional and only narrow results.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub limit: i64,
    pub content_type: Option<ContentType>,
    pub product_filter: Option<String>,
    pub similarity_threshold: f64,
}

impl SearchParams {
    /// Params with the configured default limit and threshold.
    pub fn new(query: impl Into<String>, retrieval: &RetrievalConfig) -> Self {
        Self {
            query: query.into(),
            limit: retrieval.limit,
            content_type: None,
            product_filter: None,
            similarity_threshold: retrieval.similarity_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub matches: Vec<SearchMatch>,
    pub report: String,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// One line per distinct incident number, in match order.
pub fn generate_report(matches: &[SearchMatch]) -> String {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for m in matches {
        let number = &m.incident.incident_number;
        if !seen.insert(number.as_str()) {
            continue;
        }
        let snippet: String = m
            .incident
            .description
            .chars()
            .take(REPORT_SNIPPET_CHARS)
            .collect();
        lines.push(format!(
            "Incident Number: {}:{}... (similarity:{:.3})",
            number,
            snippet,
            m.similarity_score * 100.0
        ));
    }

    lines.join("\n")
}

/// Embed the query and return ranked matches plus a report.
///
/// Never fails: a blank query, a failed embedding, or a store error all
/// yield empty results.
pub async fn search(
    store: &dyn RecordStore,
    embedder: &dyn EmbeddingProvider,
    params: &SearchParams,
) -> SearchResults {
    if params.query.trim().is_empty() {
        tracing::warn!("search called with an empty query");
        return SearchResults::default();
    }

    let Some(vector) = embed_or_none(embedder, &params.query).await else {
        tracing::error!("Failed to generate query embedding");
        return SearchResults::default();
    };

    let query = SimilarityQuery {
        vector: &vector,
        content_type: params.content_type,
        product_filter: params.product_filter.as_deref(),
        threshold: params.similarity_threshold,
        limit: params.limit,
    };

    match store.similarity_search(&query).await {
        Ok(matches) => {
            tracing::info!("Found {} similar incidents", matches.len());
            let report = generate_report(&matches);
            SearchResults { matches, report }
        }
        Err(e) => {
            tracing::error!("Error in similarity search: {:#}", e);
            SearchResults::default()
        }
    }
}

/// CLI entry point: `irag search <query>`.
pub async fn run_search(config: &Config, params: SearchParams) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = embedding::create_provider(&config.embedding)?;

    let results = search(&store, provider.as_ref(), &params).await;
    store.pool().close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, m) in results.matches.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({}, {})",
            i + 1,
            m.similarity_score,
            m.incident.incident_number,
            m.content_type,
            if m.incident.product.is_empty() {
                "-"
            } else {
                m.incident.product.as_str()
            }
        );
    }
    println!();
    println!("{}", results.report);

    Ok(())
}
