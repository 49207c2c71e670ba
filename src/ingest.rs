//! Ingestion pipeline orchestration.
//!
//! Turns raw ticket rows into stored incidents with fan-out aspect
//! embeddings: key extraction → dedup gate → field coercion → embedding →
//! storage. Every row is handled independently; row failures are counted
//! as skipped and never abort the batch.
//!
//! # Aspects
//!
//! | Content type | Text | When |
//! |--------------|------|------|
//! | `description` | the description | always |
//! | `resolution` | `Resolution:<notes>` + ` \| Tier N:<tier>` per non-empty tier | closing notes present |
//! | `combined` | `Product:<p> \| Description:<d>` + `\| Resolution:<notes>` | always |
//!
//! An aspect whose embedding fails is logged and left out. The incident is
//! stored even if every aspect fails; such rows are counted in
//! [`IngestionSummary::without_embeddings`].

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::path::Path;

use crate::config::{Config, IngestConfig};
use crate::db;
use crate::embedding::{self, embed_or_none, EmbeddingProvider};
use crate::models::{ContentType, IngestionSummary, NewEmbedding, NewIncident};
use crate::store::sqlite::SqliteStore;
use crate::store::RecordStore;

/// One raw source row: column name → cell value.
pub type RawRow = Map<String, Value>;

/// Cell values treated as absent, in addition to JSON `null`.
const MISSING_MARKERS: &[&str] = &[
    "", "nan", "NaN", "NAN", "null", "NULL", "None", "N/A", "n/a", "NA", "<NA>", "#N/A",
];

#[derive(Debug, PartialEq)]
enum RowOutcome {
    Stored { id: i64, embeddings: usize },
    MissingKey,
    Duplicate,
}

/// Runs ingestion batches against a store and an embedding provider.
pub struct Ingestor<'a> {
    store: &'a dyn RecordStore,
    embedder: &'a dyn EmbeddingProvider,
    columns: &'a IngestConfig,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        embedder: &'a dyn EmbeddingProvider,
        columns: &'a IngestConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            columns,
        }
    }

    /// Ingest a batch of rows. Never fails; see [`IngestionSummary`].
    pub async fn ingest(&self, rows: &[RawRow]) -> IngestionSummary {
        let mut summary = IngestionSummary {
            total: rows.len(),
            ..Default::default()
        };

        for (index, row) in rows.iter().enumerate() {
            tracing::info!("Processing row {} of {}", index + 1, summary.total);
            match self.ingest_row(index, row).await {
                Ok(RowOutcome::Stored { id, embeddings }) => {
                    summary.processed += 1;
                    summary.embeddings_written += embeddings;
                    if embeddings == 0 {
                        summary.without_embeddings += 1;
                        tracing::warn!(id, "row {}: stored without any embeddings", index);
                    }
                }
                Ok(RowOutcome::MissingKey) | Ok(RowOutcome::Duplicate) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!("row {}: {:#}", index, e);
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            total = summary.total,
            "ingestion finished"
        );
        summary
    }

    async fn ingest_row(&self, index: usize, row: &RawRow) -> Result<RowOutcome> {
        let Some(incident_number) = cell_text(row, &self.columns.incident_number_column) else {
            tracing::warn!("Missing incident_number in row {}", index);
            return Ok(RowOutcome::MissingKey);
        };

        // Dedup gate: must run before any embedding call.
        if self.store.exists(&incident_number).await? {
            tracing::warn!("Duplicate incident number {} in row {}", incident_number, index);
            return Ok(RowOutcome::Duplicate);
        }

        let incident = build_incident(incident_number, row, self.columns)?;

        let mut embeddings = Vec::new();
        for (content_type, text) in aspect_texts(&incident) {
            match embed_or_none(self.embedder, &text).await {
                Some(vector) => embeddings.push(NewEmbedding {
                    content_type,
                    content_text: text,
                    vector,
                }),
                None => tracing::error!(
                    "Failed to generate {} embedding for {}",
                    content_type,
                    incident.incident_number
                ),
            }
        }

        let id = self
            .store
            .persist_incident(&incident, &embeddings)
            .await?;
        tracing::info!(
            "Stored incident {} (row {}) with id {}",
            incident.incident_number,
            index,
            id
        );

        Ok(RowOutcome::Stored {
            id,
            embeddings: embeddings.len(),
        })
    }
}

/// Read a cell as text, treating null and missing markers as absent.
fn cell_text(row: &RawRow, column: &str) -> Option<String> {
    let text = match row.get(column)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if MISSING_MARKERS.contains(&text.trim()) {
        None
    } else {
        Some(text)
    }
}

fn parse_priority(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        _ => bail!("invalid priority '{}'", raw),
    }
}

fn parse_created_on(raw: &str, format: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
        return Ok(date);
    }
    // Exports often carry a time of day after the date.
    let date_part = trimmed.split_whitespace().next().unwrap_or("");
    NaiveDate::parse_from_str(date_part, format)
        .with_context(|| format!("invalid creation date '{}' (expected {})", raw, format))
}

/// Build an incident from a raw row. Fails on malformed priority or date.
fn build_incident(
    incident_number: String,
    row: &RawRow,
    columns: &IngestConfig,
) -> Result<NewIncident> {
    let priority = cell_text(row, &columns.priority_column)
        .map(|p| parse_priority(&p))
        .transpose()?;
    let created_on = cell_text(row, &columns.created_on_column)
        .map(|d| parse_created_on(&d, &columns.date_format))
        .transpose()?;

    Ok(NewIncident {
        incident_number,
        product: cell_text(row, &columns.product_column).unwrap_or_default(),
        description: cell_text(row, &columns.description_column).unwrap_or_default(),
        closing_notes: cell_text(row, &columns.closing_notes_column),
        resolution_tier_1: cell_text(row, &columns.tier_1_column),
        resolution_tier_2: cell_text(row, &columns.tier_2_column),
        resolution_tier_3: cell_text(row, &columns.tier_3_column),
        problem_id: cell_text(row, &columns.problem_id_column),
        created_on,
        created_by: cell_text(row, &columns.created_by_column).map(|s| s.trim().to_string()),
        priority,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Text embedded as the `resolution` aspect, if closing notes exist.
pub fn resolution_text(incident: &NewIncident) -> Option<String> {
    let notes = non_empty(&incident.closing_notes)?;
    let mut text = format!("Resolution:{}", notes);
    let tiers = [
        &incident.resolution_tier_1,
        &incident.resolution_tier_2,
        &incident.resolution_tier_3,
    ];
    for (n, tier) in tiers.into_iter().enumerate() {
        if let Some(tier) = non_empty(tier) {
            text.push_str(&format!(" | Tier {}:{}", n + 1, tier));
        }
    }
    Some(text)
}

/// Text embedded as the `combined` aspect.
pub fn combined_text(incident: &NewIncident) -> String {
    let mut text = format!(
        "Product:{} | Description:{}",
        incident.product, incident.description
    );
    if let Some(notes) = non_empty(&incident.closing_notes) {
        text.push_str(&format!("| Resolution:{}", notes));
    }
    text
}

/// All aspects to embed for an incident, in write order.
pub fn aspect_texts(incident: &NewIncident) -> Vec<(ContentType, String)> {
    let mut aspects = vec![(ContentType::Description, incident.description.clone())];
    if let Some(text) = resolution_text(incident) {
        aspects.push((ContentType::Resolution, text));
    }
    aspects.push((ContentType::Combined, combined_text(incident)));
    aspects
}

/// Load raw rows from a `.csv` file or a `.json` array of objects.
pub fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("csv") => read_csv_rows(path),
        Some("json") => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let rows: Vec<RawRow> = serde_json::from_str(&content)
                .with_context(|| format!("{} must hold a JSON array of objects", path.display()))?;
            Ok(rows)
        }
        _ => bail!(
            "Unsupported input file: {}. Use a .csv or .json file.",
            path.display()
        ),
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.with_context(|| format!("Malformed CSV in {}", path.display()))?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), Value::String(String::from_utf8_lossy(v).into_owned())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// CLI entry point: `irag ingest <file>`.
pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let rows = read_rows(path)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = embedding::create_provider(&config.embedding)?;

    let summary = Ingestor::new(&store, provider.as_ref(), &config.ingest)
        .ingest(&rows)
        .await;

    println!("ingest {}", path.display());
    println!("  total rows: {}", summary.total);
    println!("  processed: {}", summary.processed);
    println!("  skipped: {}", summary.skipped);
    println!("  embeddings written: {}", summary.embeddings_written);
    if summary.without_embeddings > 0 {
        println!(
            "  stored without embeddings: {} (re-run enrichment later)",
            summary.without_embeddings
        );
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    fn columns() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn test_missing_markers_become_none() {
        let r = row(json!({ "close_notes": "nan", "description": "  ", "product": null }));
        assert_eq!(cell_text(&r, "close_notes"), None);
        assert_eq!(cell_text(&r, "description"), None);
        assert_eq!(cell_text(&r, "product"), None);
        assert_eq!(cell_text(&r, "absent"), None);
    }

    #[test]
    fn test_numeric_cells_are_string_coerced() {
        let r = row(json!({ "issue_key": 12345 }));
        assert_eq!(cell_text(&r, "issue_key"), Some("12345".to_string()));
    }

    #[test]
    fn test_build_incident_coerces_fields() {
        let r = row(json!({
            "u_product_name_display_value": "Billing",
            "description": "Invoice totals wrong",
            "close_notes": "Recalculated tax table",
            "u_resolution_tier_1": "Software",
            "sys_created_on": "03/15/2024",
            "sys_created_by": "  jdoe ",
            "priority": "3.0"
        }));
        let incident = build_incident("INC1".to_string(), &r, &columns()).unwrap();
        assert_eq!(incident.priority, Some(3));
        assert_eq!(
            incident.created_on,
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(incident.created_by.as_deref(), Some("jdoe"));
        assert_eq!(incident.resolution_tier_2, None);
        assert_eq!(incident.problem_id, None);
    }

    #[test]
    fn test_created_on_with_time_of_day() {
        let date = parse_created_on("03/15/2024 10:22:01", "%m/%d/%Y").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn test_malformed_priority_is_an_error() {
        let r = row(json!({ "priority": "urgent" }));
        assert!(build_incident("INC1".to_string(), &r, &columns()).is_err());
    }

    #[test]
    fn test_malformed_date_is_an_error() {
        let r = row(json!({ "sys_created_on": "2024-03-15" }));
        assert!(build_incident("INC1".to_string(), &r, &columns()).is_err());
    }

    #[test]
    fn test_aspect_texts_full_row() {
        let r = row(json!({
            "u_product_name_display_value": "Billing",
            "description": "Invoice totals wrong",
            "close_notes": "Recalculated tax table",
            "u_resolution_tier_1": "Software",
            "u_resolution_tier_2": "Config",
            "u_resolution_tier3": "Tax"
        }));
        let incident = build_incident("INC1".to_string(), &r, &columns()).unwrap();
        let aspects = aspect_texts(&incident);
        assert_eq!(
            aspects,
            vec![
                (ContentType::Description, "Invoice totals wrong".to_string()),
                (
                    ContentType::Resolution,
                    "Resolution:Recalculated tax table | Tier 1:Software | Tier 2:Config | Tier 3:Tax"
                        .to_string()
                ),
                (
                    ContentType::Combined,
                    "Product:Billing | Description:Invoice totals wrong| Resolution:Recalculated tax table"
                        .to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_aspect_texts_skip_resolution_and_missing_tiers() {
        let r = row(json!({
            "u_product_name_display_value": "Billing",
            "description": "Invoice totals wrong",
            "u_resolution_tier_2": "Config"
        }));
        let incident = build_incident("INC1".to_string(), &r, &columns()).unwrap();
        let aspects = aspect_texts(&incident);
        assert_eq!(aspects.len(), 2);
        assert_eq!(
            aspects[1].1,
            "Product:Billing | Description:Invoice totals wrong"
        );

        let with_notes = NewIncident {
            closing_notes: Some("Restarted".to_string()),
            ..incident
        };
        assert_eq!(
            resolution_text(&with_notes).as_deref(),
            Some("Resolution:Restarted | Tier 2:Config")
        );
    }

    #[test]
    fn test_read_rows_rejects_unknown_extension() {
        assert!(read_rows(Path::new("rows.xlsx")).is_err());
    }
}
