use thiserror::Error;

/// Missing required startup values. The display text is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Error: Please provide a server URL using the --server argument.")]
    MissingServer,
    #[error(
        "Error: Please provide a bearer token using the --bearer-token argument or set the TW_MCP_BEARER_TOKEN environment variable."
    )]
    MissingBearerToken,
    #[error("Error: Please provide an LLM model using the --llm-model argument.")]
    MissingModel,
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to connect to MCP server at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<McpError>,
    },
    #[error("MCP server rejected the credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("MCP server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error("MCP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid MCP payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn connection(url: impl Into<String>, source: McpError) -> Self {
        McpError::Connection {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unsupported LLM provider '{0}' (supported: openai, anthropic, google_genai, ollama)")]
    UnsupportedProvider(String),
    #[error("cannot infer the provider for model '{0}'; use the form <provider>:<model>")]
    UnknownModel(String),
    #[error("{0} environment variable is not set")]
    MissingApiKey(&'static str),
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("LLM network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("failed to parse LLM response: {0}")]
    Parse(String),
    #[error("LLM call still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<LlmError>,
    },
}

impl LlmError {
    /// Whether the same call may succeed if sent again: network failures,
    /// rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Network(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("tool '{name}' reported an error: {message}")]
    Failed { name: String, message: String },
    #[error(transparent)]
    Mcp(#[from] McpError),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent stopped after {0} iterations without a final answer")]
    IterationLimit(usize),
    #[error(transparent)]
    Llm(#[from] LlmError),
}
