//! Single-pass tool dispatch for a user message.
//!
//! compose → offer → dispatch → terminate. The model sees a fixed system
//! prompt, the raw user message and the registry's declarations. Every
//! proposed call is run through the [`ToolRegistry`] in order and its
//! result stored under the tool name; a later call to the same tool
//! replaces an earlier result. No follow-up turn is sent to the model.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chat::{create_chat, ChatReply, ChatWithTools};
use crate::config::{ChatConfig, Config};
use crate::db;
use crate::models::ToolCallResult;
use crate::store::sqlite::SqliteStore;
use crate::store::RecordStore;
use crate::tools::{ToolContext, ToolRegistry};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. When the user asks for data like \
incidents or issues created in a time period, ALWAYS use the available tools to fetch accurate \
data. Do not guess or simulate results. Respond with tool calls in the exact format expected. \
If no tool is needed, answer directly.";

/// Tool name → result of the last call to that tool.
pub type ToolResults = BTreeMap<String, ToolCallResult>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchOutcome {
    /// The model proposed calls; each was executed.
    Tools(ToolResults),
    /// The model answered without tools.
    Direct(String),
    /// The chat backend could not be built or reached.
    Failed(ToolCallResult),
}

impl DispatchOutcome {
    /// Tool results; empty unless tools ran.
    pub fn tool_results(&self) -> ToolResults {
        match self {
            DispatchOutcome::Tools(results) => results.clone(),
            _ => ToolResults::new(),
        }
    }
}

pub struct Dispatcher {
    chat: std::result::Result<Box<dyn ChatWithTools>, String>,
    registry: ToolRegistry,
    ctx: ToolContext,
}

impl Dispatcher {
    pub fn new(chat: Box<dyn ChatWithTools>, registry: ToolRegistry, ctx: ToolContext) -> Self {
        Self {
            chat: Ok(chat),
            registry,
            ctx,
        }
    }

    /// Build the chat backend from config. A construction failure is kept
    /// and reported by every [`dispatch`](Dispatcher::dispatch).
    pub fn from_config(config: &ChatConfig, registry: ToolRegistry, ctx: ToolContext) -> Self {
        let chat = create_chat(config).map_err(|e| {
            tracing::error!("Error initializing chat: {:#}", e);
            format!("{:#}", e)
        });
        Self {
            chat,
            registry,
            ctx,
        }
    }

    pub async fn dispatch(&self, user_message: &str) -> DispatchOutcome {
        let chat = match &self.chat {
            Ok(chat) => chat,
            Err(e) => {
                return DispatchOutcome::Failed(ToolCallResult::failure(format!(
                    "Error initializing: {}",
                    e
                )))
            }
        };

        let declarations = self.registry.declarations();
        let reply = match chat.offer(SYSTEM_PROMPT, user_message, &declarations).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(model = chat.model_name(), "Error calling tool: {:#}", e);
                return DispatchOutcome::Failed(ToolCallResult::failure(format!(
                    "Error calling tool: {}",
                    e
                )));
            }
        };

        match reply {
            ChatReply::Content(content) => {
                tracing::info!("model answered without tool calls");
                DispatchOutcome::Direct(content)
            }
            ChatReply::ToolCalls(calls) => {
                tracing::info!("model proposed {} tool call(s)", calls.len());
                let mut results = ToolResults::new();
                for call in calls {
                    let result = self
                        .registry
                        .execute(&call.name, &call.arguments, &self.ctx)
                        .await;
                    if results.insert(call.name.clone(), result).is_some() {
                        tracing::warn!(tool = %call.name, "repeated tool call replaced an earlier result");
                    }
                }
                DispatchOutcome::Tools(results)
            }
        }
    }
}

/// CLI entry point: `irag ask <message>`.
pub async fn run_ask(config: &Config, message: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(pool.clone()));
    let dispatcher = Dispatcher::from_config(
        &config.chat,
        ToolRegistry::with_builtins(),
        ToolContext::new(store),
    );

    let outcome = dispatcher.dispatch(message).await;
    pool.close().await;

    match outcome {
        DispatchOutcome::Tools(results) => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        DispatchOutcome::Direct(content) => println!("{}", content),
        DispatchOutcome::Failed(result) => bail!("{}", result.message),
    }
    Ok(())
}
