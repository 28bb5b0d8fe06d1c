use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_SERVER_URL: &str = "https://mcp.ai.teamwork.com";
pub const DEFAULT_LLM_MODEL: &str = "openai:gpt-4.1";
pub const BEARER_TOKEN_ENV: &str = "TW_MCP_BEARER_TOKEN";

/// Built-in defaults the config file may override. Flags always win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub server: String,
    pub llm_model: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        DefaultsConfig {
            server: DEFAULT_SERVER_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
        }
    }
}

/// Limits and sampling settings for the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub max_llm_retries: usize,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_iterations: 12,
            max_llm_retries: 3,
            max_tokens: 4096,
            temperature: None,
            system_prompt: None,
        }
    }
}

/// Base URLs of the LLM provider APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub google_base_url: String,
    pub ollama_base_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            anthropic_base_url: "https://api.anthropic.com/v1".to_string(),
            google_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ollama_base_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        }
    }
}

/// MCP HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub client_name: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        McpConfig {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            client_name: "tw-client".to_string(),
        }
    }
}

/// Everything the optional config file can set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub defaults: DefaultsConfig,
    pub agent: AgentConfig,
    pub providers: ProvidersConfig,
    pub mcp: McpConfig,
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tw-client")
            .join("config.toml")
    }

    /// Load from `~/.tw-client/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    StreamableHttp,
}

/// Connection settings for the one MCP session of this process.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_url: String,
    pub bearer_token: String,
    pub transport: TransportKind,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("server_url", &self.server_url)
            .field("bearer_token", &"[REDACTED]")
            .field("transport", &self.transport)
            .finish()
    }
}

/// Everything needed to start a session, after defaults were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    pub session: SessionConfig,
    pub llm_model: String,
}

/// Values given on the command line, before defaulting.
#[derive(Debug, Clone, Default)]
pub struct StartupArgs {
    pub server: Option<String>,
    pub bearer_token: Option<String>,
    pub llm_model: Option<String>,
}

/// Apply defaults and check required values in the order server, token, model.
///
/// `env_token` is the value of `TW_MCP_BEARER_TOKEN`; it is only consulted when
/// no `--bearer-token` flag was given.
pub fn resolve(
    args: StartupArgs,
    defaults: &DefaultsConfig,
    env_token: Option<String>,
) -> Result<StartupConfig, ConfigError> {
    let server_url = args.server.unwrap_or_else(|| defaults.server.clone());
    let bearer_token = args.bearer_token.or(env_token).unwrap_or_default();
    let llm_model = args.llm_model.unwrap_or_else(|| defaults.llm_model.clone());

    if server_url.is_empty() {
        return Err(ConfigError::MissingServer);
    }
    if bearer_token.is_empty() {
        return Err(ConfigError::MissingBearerToken);
    }
    if llm_model.is_empty() {
        return Err(ConfigError::MissingModel);
    }

    Ok(StartupConfig {
        session: SessionConfig {
            server_url,
            bearer_token,
            transport: TransportKind::StreamableHttp,
        },
        llm_model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(server: Option<&str>, token: Option<&str>, model: Option<&str>) -> StartupArgs {
        StartupArgs {
            server: server.map(String::from),
            bearer_token: token.map(String::from),
            llm_model: model.map(String::from),
        }
    }

    #[test]
    fn flags_are_used_verbatim() {
        let cfg = resolve(
            args(Some("https://example.test"), Some("abc123"), Some("demo:model")),
            &DefaultsConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(cfg.session.server_url, "https://example.test");
        assert_eq!(cfg.session.bearer_token, "abc123");
        assert_eq!(cfg.session.transport, TransportKind::StreamableHttp);
        assert_eq!(cfg.llm_model, "demo:model");
    }

    #[test]
    fn defaults_fill_missing_flags() {
        let cfg = resolve(args(None, None, None), &DefaultsConfig::default(), Some("tok".into()))
            .unwrap();
        assert_eq!(cfg.session.server_url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.session.bearer_token, "tok");
        assert_eq!(cfg.llm_model, DEFAULT_LLM_MODEL);
    }

    #[test]
    fn flag_token_wins_over_environment() {
        let cfg = resolve(
            args(None, Some("flag"), None),
            &DefaultsConfig::default(),
            Some("env".into()),
        )
        .unwrap();
        assert_eq!(cfg.session.bearer_token, "flag");
    }

    #[test]
    fn missing_token_reports_exact_message() {
        let err = resolve(args(None, None, None), &DefaultsConfig::default(), None).unwrap_err();
        assert_eq!(err, ConfigError::MissingBearerToken);
        assert_eq!(
            err.to_string(),
            "Error: Please provide a bearer token using the --bearer-token argument or set the TW_MCP_BEARER_TOKEN environment variable."
        );
    }

    #[test]
    fn empty_values_are_missing_and_checked_in_order() {
        let err = resolve(args(Some(""), None, Some("")), &DefaultsConfig::default(), None)
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingServer);

        let err = resolve(args(None, Some("t"), Some("")), &DefaultsConfig::default(), None)
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingModel);
    }

    #[test]
    fn empty_environment_token_is_missing() {
        let err = resolve(args(None, None, None), &DefaultsConfig::default(), Some(String::new()))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingBearerToken);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[defaults]\nllm_model = \"anthropic:claude-sonnet-4-0\"\n\n[agent]\nmax_iterations = 4\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.defaults.llm_model, "anthropic:claude-sonnet-4-0");
        assert_eq!(config.defaults.server, DEFAULT_SERVER_URL);
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.max_llm_retries, 3);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[agent\nmax_iterations = ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg = resolve(
            args(None, Some("secret-token"), None),
            &DefaultsConfig::default(),
            None,
        )
        .unwrap();
        assert!(!format!("{:?}", cfg).contains("secret-token"));
    }
}
