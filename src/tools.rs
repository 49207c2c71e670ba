//! Tools the language model can call, and the registry that runs them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────────────────────────────┐    │
//! │  │ number_of_incidents_created_in_  │    │
//! │  │ days  (IncidentsByDaysTool)      │    │
//! │  └──────────────────────────────────┘    │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!   declarations() → chat capability
//!   execute(name, arguments) → ToolCallResult
//! ```
//!
//! Arguments are decoded into a closed [`ToolInvocation`] before any tool
//! runs. [`ToolRegistry::execute`] never returns an error: unknown names,
//! bad arguments and tool failures all become `error: true` results.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::models::ToolCallResult;
use crate::normalize::{normalize_days, DEFAULT_DAYS};
use crate::store::RecordStore;
use crate::summary::get_incidents_by_days;

pub const INCIDENTS_BY_DAYS: &str = "number_of_incidents_created_in_days";

/// A decoded, validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    NumberOfIncidentsCreatedInDays { days: u32 },
}

impl ToolInvocation {
    /// Decode `arguments` for the tool called `name`.
    ///
    /// `arguments` may be a JSON object or a string holding one.
    pub fn parse(name: &str, arguments: &Value) -> Result<Self> {
        let decoded;
        let args: &Map<String, Value> = match arguments {
            Value::Object(map) => map,
            Value::String(encoded) => {
                decoded = serde_json::from_str::<Value>(encoded)
                    .map_err(|e| anyhow!("arguments are not valid JSON: {}", e))?;
                decoded
                    .as_object()
                    .ok_or_else(|| anyhow!("arguments must be a JSON object"))?
            }
            other => bail!("arguments must be a JSON object, got {}", other),
        };

        match name {
            INCIDENTS_BY_DAYS => Ok(ToolInvocation::NumberOfIncidentsCreatedInDays {
                days: args.get("days").map(normalize_days).unwrap_or(DEFAULT_DAYS),
            }),
            other => bail!("unknown tool: {}", other),
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolInvocation::NumberOfIncidentsCreatedInDays { .. } => INCIDENTS_BY_DAYS,
        }
    }
}

/// A function-calling declaration offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Shared state handed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    store: Arc<dyn RecordStore>,
    today: Option<NaiveDate>,
}

impl ToolContext {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store, today: None }
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// A tool the model can discover and call.
///
/// [`parameters_schema`](Tool::parameters_schema) must be a JSON Schema
/// object with `type: "object"`, `properties` and `required`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// Run a decoded invocation addressed to this tool.
    async fn execute(
        &self,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult>;
}

/// Reports incidents created in the last `days` days.
pub struct IncidentsByDaysTool;

#[async_trait]
impl Tool for IncidentsByDaysTool {
    fn name(&self) -> &str {
        INCIDENTS_BY_DAYS
    }

    fn description(&self) -> &str {
        "Get list of incidents or documents created in last X number of days"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": { "type": "number", "description": "Number of days" }
            },
            "required": ["days"]
        })
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult> {
        match invocation {
            ToolInvocation::NumberOfIncidentsCreatedInDays { days } => {
                let summary = get_incidents_by_days(ctx.store(), *days, ctx.today()).await?;
                if summary.count == 0 {
                    return Ok(ToolCallResult::failure("No incidents found for the given days"));
                }
                Ok(ToolCallResult::ok(
                    "Incidents retrieved for last days",
                    serde_json::to_value(&summary)?,
                ))
            }
        }
    }
}

/// Registry of callable tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the incidents-by-days tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(IncidentsByDaysTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .iter()
            .map(|t| ToolDeclaration {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Resolve, decode and run one call. Failures become error results.
    pub async fn execute(&self, name: &str, arguments: &Value, ctx: &ToolContext) -> ToolCallResult {
        let Some(tool) = self.find(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return ToolCallResult::failure(format!("unknown tool: {}", name));
        };

        let outcome = match ToolInvocation::parse(name, arguments) {
            Ok(invocation) => {
                tracing::info!(tool = name, ?invocation, "executing tool");
                tool.execute(&invocation, ctx).await
            }
            Err(e) => Err(e),
        };

        outcome.unwrap_or_else(|e| {
            tracing::error!(tool = name, "tool failed: {:#}", e);
            ToolCallResult::failure(format!("Error executing {}: {}", name, e))
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewIncident;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn test_parse_object_and_encoded_arguments() {
        assert_eq!(
            ToolInvocation::parse(INCIDENTS_BY_DAYS, &json!({ "days": "2 weeks" })).unwrap(),
            ToolInvocation::NumberOfIncidentsCreatedInDays { days: 14 }
        );
        assert_eq!(
            ToolInvocation::parse(INCIDENTS_BY_DAYS, &json!("{\"days\": 3}")).unwrap(),
            ToolInvocation::NumberOfIncidentsCreatedInDays { days: 3 }
        );
    }

    #[test]
    fn test_missing_days_defaults_to_a_week() {
        let invocation = ToolInvocation::parse(INCIDENTS_BY_DAYS, &json!({})).unwrap();
        assert_eq!(
            invocation,
            ToolInvocation::NumberOfIncidentsCreatedInDays { days: 7 }
        );
        assert_eq!(invocation.tool_name(), INCIDENTS_BY_DAYS);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(ToolInvocation::parse(INCIDENTS_BY_DAYS, &json!("not json")).is_err());
        assert!(ToolInvocation::parse(INCIDENTS_BY_DAYS, &json!("[1]")).is_err());
        assert!(ToolInvocation::parse(INCIDENTS_BY_DAYS, &json!(5)).is_err());
        assert!(ToolInvocation::parse("delete_everything", &json!({})).is_err());
    }

    #[test]
    fn test_declarations() {
        let registry = ToolRegistry::with_builtins();
        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, INCIDENTS_BY_DAYS);
        assert_eq!(declarations[0].parameters["required"], json!(["days"]));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_an_error_result() {
        let registry = ToolRegistry::with_builtins();
        let ctx = ToolContext::new(Arc::new(InMemoryStore::new()));
        let result = registry.execute("nope", &json!({}), &ctx).await;
        assert!(result.error);
        assert_eq!(result.message, "unknown tool: nope");
        assert!(result.result.is_none());
    }

    #[tokio::test]
    async fn test_execute_bad_arguments_is_an_error_result() {
        let registry = ToolRegistry::with_builtins();
        let ctx = ToolContext::new(Arc::new(InMemoryStore::new()));
        let result = registry
            .execute(INCIDENTS_BY_DAYS, &json!("{oops"), &ctx)
            .await;
        assert!(result.error);
        assert!(result
            .message
            .starts_with("Error executing number_of_incidents_created_in_days"));
    }

    #[tokio::test]
    async fn test_incidents_tool_messages() {
        let store = Arc::new(InMemoryStore::new());
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let ctx = ToolContext::new(store.clone()).with_today(today);
        let registry = ToolRegistry::with_builtins();

        let empty = registry
            .execute(INCIDENTS_BY_DAYS, &json!({ "days": 7 }), &ctx)
            .await;
        assert!(empty.error);
        assert_eq!(empty.message, "No incidents found for the given days");

        store
            .insert_incident(&NewIncident {
                incident_number: "INC1".to_string(),
                product: "Billing".to_string(),
                description: "Invoice totals wrong".to_string(),
                closing_notes: None,
                resolution_tier_1: None,
                resolution_tier_2: None,
                resolution_tier_3: None,
                problem_id: None,
                created_on: NaiveDate::from_ymd_opt(2024, 6, 8),
                created_by: Some("amy".to_string()),
                priority: Some(2),
            })
            .await
            .unwrap();

        let found = registry
            .execute(INCIDENTS_BY_DAYS, &json!({ "days": "a week" }), &ctx)
            .await;
        assert!(!found.error);
        assert_eq!(found.message, "Incidents retrieved for last days");
        assert_eq!(found.result.unwrap()["count"], 1);
    }
}
