use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::llm::{http_client, read_json, LlmClient, LlmReply};
use crate::config::AgentConfig;
use crate::error::LlmError;
use crate::types::{Message, Role, ToolCall, ToolDefinition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OllamaToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OllamaTool<'a> {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: &'a ToolDefinition,
}

#[derive(Debug, Serialize)]
pub struct OllamaRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OllamaTool<'a>>,
    pub stream: bool,
    pub options: Value,
}

#[derive(Debug, Deserialize)]
pub struct OllamaResponse {
    pub message: OllamaMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Local Ollama `/api/chat` client.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, agent: &AgentConfig) -> Result<Self, LlmError> {
        Ok(OllamaClient {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }

    pub(crate) fn build_request<'a>(&'a self, messages: &[Message], tools: &'a [ToolDefinition]) -> OllamaRequest<'a> {
        let messages = messages
            .iter()
            .map(|m| OllamaMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::Human => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string(),
                content: m.content.clone(),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|c| OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: c.name.clone(),
                            arguments: c.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_name: m.name.clone(),
            })
            .collect();

        let mut options = serde_json::json!({ "num_predict": self.max_tokens });
        if let Some(temperature) = self.temperature {
            options["temperature"] = serde_json::json!(temperature);
        }

        OllamaRequest {
            model: &self.model,
            messages,
            tools: tools
                .iter()
                .map(|t| OllamaTool {
                    tool_type: "function",
                    function: t,
                })
                .collect(),
            stream: false,
            options,
        }
    }

    pub(crate) fn parse_response(&self, response: OllamaResponse) -> Result<LlmReply, LlmError> {
        if let Some(err) = response.error {
            return Err(LlmError::Api { status: 200, body: err });
        }

        // Ollama does not assign ids to tool calls.
        let tool_calls = response
            .message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: c.function.name,
                arguments: parse_arguments(c.function.arguments),
            })
            .collect();

        Ok(LlmReply {
            content: response.message.content,
            tool_calls,
        })
    }
}

/// Some models send arguments as a JSON string instead of an object.
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.build_request(messages, tools))
            .send()
            .await?;

        let json = read_json(response).await?;
        let response: OllamaResponse = serde_json::from_value(json)
            .map_err(|e| LlmError::Parse(format!("unexpected Ollama response: {}", e)))?;

        self.parse_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OllamaClient {
        OllamaClient::new("http://localhost:11434/", "qwen3:4b", &AgentConfig::default()).unwrap()
    }

    #[test]
    fn request_uses_ollama_roles_and_tool_names() {
        let call = ToolCall {
            id: "x".to_string(),
            name: "twprojects-get_me".to_string(),
            arguments: json!({}),
        };
        let messages = vec![
            Message::human("who am I"),
            Message::assistant("", vec![call.clone()]),
            Message::tool_result(&call, "{\"id\":1}"),
        ];
        let client = client();
        let request = serde_json::to_value(client.build_request(&messages, &[])).unwrap();

        assert_eq!(request["model"], "qwen3:4b");
        assert_eq!(request["stream"], false);
        assert_eq!(request["messages"][1]["tool_calls"][0]["function"]["name"], "twprojects-get_me");
        assert_eq!(request["messages"][2]["role"], "tool");
        assert_eq!(request["messages"][2]["tool_name"], "twprojects-get_me");
        assert!(request.get("tools").is_none());
    }

    #[test]
    fn string_arguments_are_decoded() {
        let response: OllamaResponse = serde_json::from_value(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "t", "arguments": "{\"a\":1}"}}]
            },
            "done": true
        }))
        .unwrap();
        let reply = client().parse_response(response).unwrap();
        assert_eq!(reply.tool_calls[0].arguments, json!({"a": 1}));
    }

    #[test]
    fn error_field_is_reported() {
        let response: OllamaResponse = serde_json::from_value(json!({
            "message": {"role": "assistant", "content": ""},
            "error": "model not found"
        }))
        .unwrap();
        assert!(matches!(
            client().parse_response(response),
            Err(LlmError::Api { body, .. }) if body == "model not found"
        ));
    }
}
