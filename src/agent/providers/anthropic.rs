//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::agent::llm::{http_client, read_json, LlmClient, LlmReply};
use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::types::{Message, Role, ToolCall, ToolDefinition};

pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl AnthropicClient {
    pub fn new(api_key: String, base_url: &str, model: &str, agent: &AgentConfig) -> Result<Self, LlmError> {
        Ok(AnthropicClient {
            http: http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }

    pub(crate) fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut msgs: Vec<Value> = Vec::new();
        let mut system: Option<&str> = None;

        for msg in messages {
            match msg.role {
                Role::System => system = Some(msg.content.as_str()),
                Role::Human => msgs.push(json!({ "role": "user", "content": msg.content })),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({ "type": "text", "text": msg.content }));
                    }
                    for call in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    msgs.push(json!({ "role": "assistant", "content": blocks }));
                }
                Role::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                    });
                    // Results of one assistant turn travel in a single user message.
                    let merged = msgs.last_mut().and_then(|last| {
                        let is_results = last["role"] == "user"
                            && last["content"]
                                .as_array()
                                .map(|b| b.iter().all(|b| b["type"] == "tool_result"))
                                .unwrap_or(false);
                        if is_results {
                            last["content"].as_array_mut()
                        } else {
                            None
                        }
                    });
                    match merged {
                        Some(blocks) => blocks.push(block),
                        None => msgs.push(json!({ "role": "user", "content": [block] })),
                    }
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": msgs,
        });

        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() {
            let defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(defs);
        }

        body
    }

    pub(crate) fn parse_response(&self, json: Value) -> Result<LlmReply, LlmError> {
        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| LlmError::Parse("no content in response".to_string()))?;

        let content = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        let tool_calls = blocks
            .iter()
            .filter(|b| b["type"] == "tool_use")
            .map(|b| ToolCall {
                id: b["id"].as_str().unwrap_or_default().to_string(),
                name: b["name"].as_str().unwrap_or_default().to_string(),
                arguments: b["input"].clone(),
            })
            .collect();

        Ok(LlmReply { content, tool_calls })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply, LlmError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request_body(messages, tools))
            .send()
            .await?;

        self.parse_response(read_json(response).await?)
    }
}
