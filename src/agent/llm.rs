use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::config::{AgentConfig, ProvidersConfig};
use crate::error::LlmError;
use crate::types::{Message, ToolCall, ToolDefinition};

use super::providers::{AnthropicClient, GoogleClient, OllamaClient, OpenAiClient};

/// One model turn: text plus any requested tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

impl Provider {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "google_genai" | "google" => Some(Provider::Google),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    fn infer(model: &str) -> Option<Self> {
        let model = model.to_ascii_lowercase();
        if model.starts_with("gpt-")
            || model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("o4")
        {
            Some(Provider::OpenAi)
        } else if model.starts_with("claude") {
            Some(Provider::Anthropic)
        } else if model.starts_with("gemini") {
            Some(Provider::Google)
        } else {
            None
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google_genai",
            Provider::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

/// A model identifier of the form `provider:model`, or a bare model name
/// whose provider can be inferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: Provider,
    pub model: String,
}

impl ModelSpec {
    pub fn parse(identifier: &str) -> Result<Self, LlmError> {
        match identifier.split_once(':') {
            Some((prefix, model)) => match Provider::from_prefix(prefix) {
                Some(provider) => Ok(ModelSpec {
                    provider,
                    model: model.to_string(),
                }),
                // A bare model name may contain a colon itself.
                None => Provider::infer(identifier)
                    .map(|provider| ModelSpec {
                        provider,
                        model: identifier.to_string(),
                    })
                    .ok_or_else(|| LlmError::UnsupportedProvider(prefix.to_string())),
            },
            None => Provider::infer(identifier)
                .map(|provider| ModelSpec {
                    provider,
                    model: identifier.to_string(),
                })
                .ok_or_else(|| LlmError::UnknownModel(identifier.to_string())),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

fn api_key(var: &'static str) -> Result<String, LlmError> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(LlmError::MissingApiKey(var)),
    }
}

/// Build the client for `spec`, reading the provider API key from the environment.
pub fn build_client(
    spec: &ModelSpec,
    agent: &AgentConfig,
    providers: &ProvidersConfig,
) -> Result<Box<dyn LlmClient>, LlmError> {
    let client: Box<dyn LlmClient> = match spec.provider {
        Provider::OpenAi => Box::new(OpenAiClient::new(
            api_key("OPENAI_API_KEY")?,
            &providers.openai_base_url,
            &spec.model,
            agent,
        )?),
        Provider::Anthropic => Box::new(AnthropicClient::new(
            api_key("ANTHROPIC_API_KEY")?,
            &providers.anthropic_base_url,
            &spec.model,
            agent,
        )?),
        Provider::Google => Box::new(GoogleClient::new(
            api_key("GOOGLE_API_KEY")?,
            &providers.google_base_url,
            &spec.model,
            agent,
        )?),
        Provider::Ollama => Box::new(OllamaClient::new(
            &providers.ollama_base_url,
            &spec.model,
            agent,
        )?),
    };
    Ok(client)
}

pub(crate) fn http_client() -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(300))
        .build()?)
}

/// Read a response body and fail on non-2xx status.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(LlmError::Api {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| LlmError::Parse(format!("{}: {}", e, text)))
}

/// Wraps a client and retries failed calls with exponential backoff.
pub struct RetryingClient {
    inner: Box<dyn LlmClient>,
    max_retries: usize,
    base_delay: Duration,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn LlmClient>, max_retries: usize) -> Self {
        RetryingClient {
            inner,
            max_retries: max_retries.max(1),
            base_delay: Duration::from_millis(100),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply, LlmError> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.inner.chat(messages, tools).await {
                Ok(reply) => return Ok(reply),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(
                            attempt,
                            max = self.max_retries,
                            error = %e,
                            "LLM call failed, retrying"
                        );
                        tokio::time::sleep(self.base_delay * (1u32 << attempt.min(16))).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries,
            source: Box::new(last_error.unwrap_or_else(|| LlmError::Parse("no attempt made".to_string()))),
        })
    }
}
