//! Creation-window summaries backing the incidents tool.

use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::Config;
use crate::db;
use crate::models::{IncidentRecord, Priority};
use crate::normalize::parse_period;
use crate::store::sqlite::SqliteStore;
use crate::store::RecordStore;

/// Resolution details for one incident.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub incident_number: String,
    pub description: String,
    pub closing_notes: Option<String>,
    pub resolution_tier_1: Option<String>,
    pub resolution_tier_2: Option<String>,
    pub resolution_tier_3: Option<String>,
    pub product: String,
    pub priority_level: Priority,
    pub created_by: Option<String>,
    pub created_on: Option<NaiveDate>,
}

impl From<&IncidentRecord> for Solution {
    fn from(record: &IncidentRecord) -> Self {
        Self {
            incident_number: record.incident_number.clone(),
            description: record.description.clone(),
            closing_notes: record.closing_notes.clone(),
            resolution_tier_1: record.resolution_tier_1.clone(),
            resolution_tier_2: record.resolution_tier_2.clone(),
            resolution_tier_3: record.resolution_tier_3.clone(),
            product: record.product.clone(),
            priority_level: record.priority_level(),
            created_by: record.created_by.clone(),
            created_on: record.created_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarizedIncident {
    #[serde(flatten)]
    pub record: IncidentRecord,
    pub priority_level: Priority,
}

/// Incidents created within a window, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncidentSummary {
    pub count: usize,
    pub incident_numbers: Vec<String>,
    pub created_by_users: Vec<String>,
    pub priority: Vec<Option<i64>>,
    pub solutions: Vec<Solution>,
    pub incidents: Vec<SummarizedIncident>,
}

impl IncidentSummary {
    pub fn from_records(records: Vec<IncidentRecord>) -> Self {
        let mut users_seen = HashSet::new();
        let mut numbers_seen = HashSet::new();
        let mut summary = IncidentSummary {
            count: records.len(),
            ..Default::default()
        };

        for record in records {
            summary.incident_numbers.push(record.incident_number.clone());
            summary.priority.push(record.priority);
            if let Some(user) = record.created_by.as_deref().filter(|u| !u.is_empty()) {
                if users_seen.insert(user.to_string()) {
                    summary.created_by_users.push(user.to_string());
                }
            }
            if numbers_seen.insert(record.incident_number.clone()) {
                summary.solutions.push(Solution::from(&record));
            }
            summary.incidents.push(SummarizedIncident {
                priority_level: record.priority_level(),
                record,
            });
        }

        summary
    }
}

/// Summarize incidents created on or after `today - days`, up to `today`.
pub async fn get_incidents_by_days(
    store: &dyn RecordStore,
    days: u32,
    today: NaiveDate,
) -> Result<IncidentSummary> {
    let cutoff = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    tracing::info!(days, %cutoff, "fetching incidents by creation date");

    let records = store.incidents_created_between(cutoff, today).await?;
    Ok(IncidentSummary::from_records(records))
}

/// CLI entry point: `irag incidents <period>`.
pub async fn run_incidents(config: &Config, period: &str) -> Result<()> {
    let days = parse_period(period);
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let summary = get_incidents_by_days(&store, days, Local::now().date_naive()).await?;
    store.pool().close().await;

    println!("Incidents created in the last {} day(s): {}", days, summary.count);
    if summary.count == 0 {
        return Ok(());
    }
    println!();
    for incident in &summary.incidents {
        let record = &incident.record;
        println!(
            "  {:<14} {:<10} {:<9} {:<16} {}",
            record.incident_number,
            record
                .created_on
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            incident.priority_level,
            record.created_by.as_deref().unwrap_or("-"),
            record.product
        );
    }
    println!();
    println!("  Created by: {}", summary.created_by_users.join(", "));

    Ok(())
}
