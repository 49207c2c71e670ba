//! Core data models used throughout incident-rag.
//!
//! These types represent the incidents, aspect embeddings, search matches,
//! and tool results that flow through ingestion, retrieval, and dispatch.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ticket priority, stored as an integer 1–4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl Priority {
    pub fn from_level(level: Option<i64>) -> Self {
        match level {
            Some(1) => Priority::Low,
            Some(2) => Priority::Medium,
            Some(3) => Priority::High,
            Some(4) => Priority::Critical,
            _ => Priority::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
            Priority::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which facet of an incident an embedding represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Description,
    Resolution,
    Combined,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Description => "description",
            ContentType::Resolution => "resolution",
            ContentType::Combined => "combined",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "description" => Ok(ContentType::Description),
            "resolution" => Ok(ContentType::Resolution),
            "combined" => Ok(ContentType::Combined),
            other => bail!(
                "invalid content_type '{}'. Use description, resolution, or combined.",
                other
            ),
        }
    }
}

/// An incident as built by ingestion, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIncident {
    pub incident_number: String,
    pub product: String,
    pub description: String,
    pub closing_notes: Option<String>,
    pub resolution_tier_1: Option<String>,
    pub resolution_tier_2: Option<String>,
    pub resolution_tier_3: Option<String>,
    pub problem_id: Option<String>,
    pub created_on: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub priority: Option<i64>,
}

/// A persisted incident, owned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentRecord {
    pub id: i64,
    pub incident_number: String,
    pub product: String,
    pub description: String,
    pub closing_notes: Option<String>,
    pub resolution_tier_1: Option<String>,
    pub resolution_tier_2: Option<String>,
    pub resolution_tier_3: Option<String>,
    pub problem_id: Option<String>,
    pub created_on: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub priority: Option<i64>,
}

impl IncidentRecord {
    pub fn from_new(id: i64, incident: &NewIncident) -> Self {
        Self {
            id,
            incident_number: incident.incident_number.clone(),
            product: incident.product.clone(),
            description: incident.description.clone(),
            closing_notes: incident.closing_notes.clone(),
            resolution_tier_1: incident.resolution_tier_1.clone(),
            resolution_tier_2: incident.resolution_tier_2.clone(),
            resolution_tier_3: incident.resolution_tier_3.clone(),
            problem_id: incident.problem_id.clone(),
            created_on: incident.created_on,
            created_by: incident.created_by.clone(),
            priority: incident.priority,
        }
    }

    pub fn priority_level(&self) -> Priority {
        Priority::from_level(self.priority)
    }
}

/// One embedded aspect of an incident, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmbedding {
    pub content_type: ContentType,
    pub content_text: String,
    pub vector: Vec<f32>,
}

/// A stored aspect embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub incident_id: i64,
    pub content_type: ContentType,
    pub content_text: String,
    pub vector: Vec<f32>,
}

/// A similarity search hit: the matched incident plus score and aspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    #[serde(flatten)]
    pub incident: IncidentRecord,
    pub similarity_score: f64,
    pub content_type: ContentType,
}

/// Counted entities in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Incidents,
    Embeddings,
}

/// Aggregate result of one ingestion batch.
///
/// `processed + skipped == total` always holds. `without_embeddings`
/// counts processed incidents whose every aspect failed to embed; those
/// rows are stored and can be re-enriched later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub processed: usize,
    pub skipped: usize,
    pub total: usize,
    pub embeddings_written: usize,
    pub without_embeddings: usize,
}

/// Structured outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallResult {
    pub error: bool,
    pub message: String,
    pub result: Option<serde_json::Value>,
}

impl ToolCallResult {
    pub fn ok(message: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            error: false,
            message: message.into(),
            result: Some(result),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            result: None,
        }
    }
}
