//! Chat-with-tools backends.
//!
//! A [`ChatWithTools`] implementation sends one system prompt, one user
//! message and the tool declarations to a language model and reports
//! whether the model proposed tool calls or answered directly. It never
//! runs tools itself; see [`crate::dispatch`].
//!
//! | Provider | Endpoint | Tool arguments arrive as |
//! |----------|----------|--------------------------|
//! | `ollama` | `POST {url}/api/chat` | JSON objects |
//! | `openai` | `POST {url}/v1/chat/completions` | JSON-encoded strings |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ChatConfig;
use crate::embedding::{post_with_retry, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_URL};
use crate::tools::ToolDeclaration;

const CHAT_MAX_RETRIES: u32 = 2;

/// Name given to a proposed call that arrived without one.
pub const UNNAMED_CALL_PREFIX: &str = "unnamed_tool_call_";

/// A tool call proposed by the model, arguments still undecoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedCall {
    pub name: String,
    pub arguments: Value,
}

/// What the model did with the offered tools.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    ToolCalls(Vec<ProposedCall>),
    Content(String),
}

#[async_trait]
pub trait ChatWithTools: Send + Sync {
    fn model_name(&self) -> &str;

    async fn offer(
        &self,
        system_prompt: &str,
        user_message: &str,
        declarations: &[ToolDeclaration],
    ) -> Result<ChatReply>;
}

fn request_body(
    model: &str,
    system_prompt: &str,
    user_message: &str,
    declarations: &[ToolDeclaration],
) -> Value {
    let tools: Vec<Value> = declarations
        .iter()
        .map(|d| {
            json!({
                "type": "function",
                "function": {
                    "name": d.name,
                    "description": d.description,
                    "parameters": d.parameters,
                }
            })
        })
        .collect();

    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_message },
        ],
        "tools": tools,
    })
}

/// Read an assistant `message` object in either wire dialect.
fn parse_assistant_message(message: &Value) -> Result<ChatReply> {
    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        if !calls.is_empty() {
            let mut proposed = Vec::with_capacity(calls.len());
            for (index, call) in calls.iter().enumerate() {
                let function = call.get("function");
                let name = function
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .filter(|n| !n.trim().is_empty());
                match name {
                    Some(name) => proposed.push(ProposedCall {
                        name: name.to_string(),
                        arguments: function
                            .and_then(|f| f.get("arguments"))
                            .cloned()
                            .unwrap_or(Value::Null),
                    }),
                    None => {
                        // Kept under a name no tool has, so the registry
                        // reports it and the rest of the batch still runs.
                        tracing::warn!("tool call #{} has no name: {}", index, call);
                        proposed.push(ProposedCall {
                            name: format!("{}{}", UNNAMED_CALL_PREFIX, index),
                            arguments: call.clone(),
                        });
                    }
                }
            }
            return Ok(ChatReply::ToolCalls(proposed));
        }
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    Ok(ChatReply::Content(content.to_string()))
}

fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ Ollama ============

/// Chat through a local Ollama instance, non-streaming.
pub struct OllamaChat {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatWithTools for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn offer(
        &self,
        system_prompt: &str,
        user_message: &str,
        declarations: &[ToolDeclaration],
    ) -> Result<ChatReply> {
        let mut body = request_body(&self.model, system_prompt, user_message, declarations);
        body["stream"] = Value::Bool(false);

        let endpoint = format!("{}/api/chat", self.url);
        let json = post_with_retry(
            &self.client,
            &endpoint,
            None,
            &body,
            CHAT_MAX_RETRIES,
            "Ollama chat",
        )
        .await?;

        let message = json
            .get("message")
            .ok_or_else(|| anyhow!("Ollama chat response missing 'message'"))?;
        parse_assistant_message(message)
    }
}

// ============ OpenAI-compatible ============

/// Chat through an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// `OPENAI_API_KEY` is sent as a bearer token when set; local
/// OpenAI-compatible servers usually run without one.
pub struct OpenAiCompatibleChat {
    model: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').trim_end_matches("/v1").to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatWithTools for OpenAiCompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn offer(
        &self,
        system_prompt: &str,
        user_message: &str,
        declarations: &[ToolDeclaration],
    ) -> Result<ChatReply> {
        let body = request_body(&self.model, system_prompt, user_message, declarations);
        let endpoint = format!("{}/v1/chat/completions", self.url);
        let json = post_with_retry(
            &self.client,
            &endpoint,
            self.api_key.as_deref(),
            &body,
            CHAT_MAX_RETRIES,
            "OpenAI chat",
        )
        .await?;

        let message = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| anyhow!("chat completion response missing choices[0].message"))?;
        parse_assistant_message(message)
    }
}

/// Build the configured chat backend. `disabled` is an error.
pub fn create_chat(config: &ChatConfig) -> Result<Box<dyn ChatWithTools>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        "openai" => Ok(Box::new(OpenAiCompatibleChat::new(config)?)),
        "disabled" => bail!("Chat is disabled. Set [chat] provider in config."),
        other => bail!("Unknown chat provider: {}", other),
    }
}
