//! OpenAI chat completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::agent::llm::{http_client, read_json, LlmClient, LlmReply};
use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::types::{Message, Role, ToolCall, ToolDefinition};

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: &str, model: &str, agent: &AgentConfig) -> Result<Self, LlmError> {
        Ok(OpenAiClient {
            http: http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }

    pub(crate) fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let msgs: Vec<Value> = messages.iter().map(to_openai_message).collect();

        let mut body = json!({
            "model": self.model,
            "messages": msgs,
            "max_completion_tokens": self.max_tokens,
        });

        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }

        if !tools.is_empty() {
            let defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(defs);
        }

        body
    }

    pub(crate) fn parse_response(&self, json: Value) -> Result<LlmReply, LlmError> {
        let message = json["choices"]
            .get(0)
            .map(|c| &c["message"])
            .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))?;

        let content = message["content"].as_str().unwrap_or_default().to_string();

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|c| {
                        let raw = c["function"]["arguments"].as_str().unwrap_or("{}");
                        ToolCall {
                            id: c["id"].as_str().unwrap_or_default().to_string(),
                            name: c["function"]["name"].as_str().unwrap_or_default().to_string(),
                            arguments: serde_json::from_str(raw)
                                .unwrap_or_else(|_| Value::String(raw.to_string())),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(LlmReply { content, tool_calls })
    }
}

fn to_openai_message(msg: &Message) -> Value {
    match msg.role {
        Role::System => json!({ "role": "system", "content": msg.content }),
        Role::Human => json!({ "role": "user", "content": msg.content }),
        Role::Assistant if msg.tool_calls.is_empty() => {
            json!({ "role": "assistant", "content": msg.content })
        }
        Role::Assistant => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                json!(msg.content)
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request_body(messages, tools))
            .send()
            .await?;

        self.parse_response(read_json(response).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(
            "sk-test".to_string(),
            "https://api.openai.com/v1/",
            "gpt-4.1",
            &AgentConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn request_carries_tool_calls_and_results() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "twprojects-list_projects".to_string(),
            arguments: json!({"page": 1}),
        };
        let messages = vec![
            Message::human("list projects"),
            Message::assistant("", vec![call.clone()]),
            Message::tool_result(&call, "[]"),
        ];
        let tools = vec![ToolDefinition {
            name: "twprojects-list_projects".to_string(),
            description: "List projects".to_string(),
            parameters: json!({"type": "object"}),
        }];

        let body = client().build_request_body(&messages, &tools);
        assert_eq!(body["model"], "gpt-4.1");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "list projects"}));
        assert_eq!(body["messages"][1]["content"], Value::Null);
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["arguments"], "{\"page\":1}");
        assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "twprojects-list_projects");
    }

    #[test]
    fn parses_text_and_tool_calls() {
        let reply = client()
            .parse_response(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_9",
                            "type": "function",
                            "function": {"name": "twprojects-get_me", "arguments": "{}"}
                        }]
                    }
                }]
            }))
            .unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls[0].id, "call_9");
        assert_eq!(reply.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn missing_choices_is_parse_error() {
        assert!(matches!(client().parse_response(json!({})), Err(LlmError::Parse(_))));
    }
}
