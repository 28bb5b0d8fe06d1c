//! Gemini generateContent client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::agent::llm::{http_client, read_json, LlmClient, LlmReply};
use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::types::{Message, Role, ToolCall, ToolDefinition};

pub struct GoogleClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl GoogleClient {
    pub fn new(api_key: String, base_url: &str, model: &str, agent: &AgentConfig) -> Result<Self, LlmError> {
        Ok(GoogleClient {
            http: http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }

    pub(crate) fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    pub(crate) fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system: Option<&str> = None;

        for msg in messages {
            let (role, part) = match msg.role {
                Role::System => {
                    system = Some(msg.content.as_str());
                    continue;
                }
                Role::Human => ("user", vec![json!({ "text": msg.content })]),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(json!({ "text": msg.content }));
                    }
                    for call in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": { "name": call.name, "args": call.arguments }
                        }));
                    }
                    ("model", parts)
                }
                Role::Tool => (
                    "user",
                    vec![json!({
                        "functionResponse": {
                            "name": msg.name.clone().unwrap_or_default(),
                            "response": { "content": msg.content },
                        }
                    })],
                ),
            };

            // Consecutive function responses share one turn.
            let appended = msg.role == Role::Tool
                && contents.last_mut().map_or(false, |last| {
                    let is_responses = last["role"] == "user"
                        && last["parts"]
                            .as_array()
                            .map(|p| p.iter().all(|p| p.get("functionResponse").is_some()))
                            .unwrap_or(false);
                    if is_responses {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.extend(part.iter().cloned());
                        }
                    }
                    is_responses
                });

            if !appended {
                contents.push(json!({ "role": role, "parts": part }));
            }
        }

        let mut generation = json!({ "maxOutputTokens": self.max_tokens });
        if let Some(temperature) = self.temperature {
            generation["temperature"] = json!(temperature);
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation,
        });

        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        if !tools.is_empty() {
            let decls: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": decls }]);
        }

        body
    }

    pub(crate) fn parse_response(&self, json: Value) -> Result<LlmReply, LlmError> {
        let first = json["candidates"]
            .get(0)
            .ok_or_else(|| LlmError::Parse("no candidates in response".to_string()))?;

        let parts = first["content"]["parts"].as_array().cloned().unwrap_or_default();

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for part in &parts {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
            if let Some(fc) = part.get("functionCall") {
                tool_calls.push(ToolCall {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: fc["name"].as_str().unwrap_or_default().to_string(),
                    arguments: fc["args"].clone(),
                });
            }
        }

        Ok(LlmReply { content, tool_calls })
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply, LlmError> {
        let response = self
            .http
            .post(self.api_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request_body(messages, tools))
            .send()
            .await?;

        self.parse_response(read_json(response).await?)
    }
}
