use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::agent::{build_client, ConversationAgent, ModelSpec, ReactAgent, RetryingClient};
use crate::config::{self, Config, StartupArgs, StartupConfig, BEARER_TOKEN_ENV};
use crate::mcp::McpSession;
use crate::repl::{self, LineInput, LineReader, LoopExit, ReedlineSource, StdinSource, FAREWELL, PROMPT};
use crate::shutdown::{install_signal_handlers, until_cancelled};
use crate::tools::{load_mcp_tools, ToolRegistry};

const DEFAULT_LOG_FILTER: &str = "tw_client=warn";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Chat with an LLM agent that can use the tools of a Teamwork.com MCP server.
#[derive(Parser, Debug)]
#[command(name = "tw-client", version, about)]
pub struct Args {
    /// The MCP server URL to connect to (default: https://mcp.ai.teamwork.com)
    #[arg(long)]
    pub server: Option<String>,

    /// Bearer token for the MCP server (default: from TW_MCP_BEARER_TOKEN)
    #[arg(long)]
    pub bearer_token: Option<String>,

    /// The LLM model to use, as <provider>:<model> (default: openai:gpt-4.1)
    #[arg(long)]
    pub llm_model: Option<String>,

    /// Config file path override (default: ~/.tw-client/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level for diagnostics on stderr (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    fn startup_args(&self) -> StartupArgs {
        StartupArgs {
            server: self.server.clone(),
            bearer_token: self.bearer_token.clone(),
            llm_model: self.llm_model.clone(),
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(format!("tw_client={}", level))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Build the production agent: provider client with retries, bound to `tools`.
pub fn build_agent(
    llm_model: &str,
    tools: ToolRegistry,
    config: &Config,
) -> Result<Box<dyn ConversationAgent>> {
    let spec = ModelSpec::parse(llm_model)?;
    let client = build_client(&spec, &config.agent, &config.providers)
        .with_context(|| format!("failed to set up model {}", spec))?;
    let client = RetryingClient::new(client, config.agent.max_llm_retries);

    tracing::info!(model = %spec, tools = tools.len(), "agent ready");
    Ok(Box::new(ReactAgent::new(Box::new(client), tools, config.agent.clone())))
}

fn open_input() -> io::Result<LineReader> {
    if io::stdin().is_terminal() {
        LineReader::spawn(|| Ok(ReedlineSource::new(PROMPT)))
    } else {
        LineReader::spawn(|| Ok(StdinSource::new(io::stdin().lock(), io::stdout(), PROMPT)))
    }
}

/// Open the MCP session, load its tools, build the agent and run the loop.
///
/// The session is closed on every path once it was opened, including errors
/// and cancellation.
pub async fn run_session<I, W, F>(
    startup: &StartupConfig,
    config: &Config,
    cancel: &CancellationToken,
    input: &mut I,
    out: &mut W,
    make_agent: F,
) -> Result<LoopExit>
where
    I: LineInput + ?Sized,
    W: Write,
    F: FnOnce(&str, ToolRegistry, &Config) -> Result<Box<dyn ConversationAgent>>,
{
    let Some(session) = until_cancelled(cancel, McpSession::open(&startup.session, &config.mcp)).await else {
        writeln!(out, "{}", FAREWELL)?;
        return Ok(LoopExit::Interrupted);
    };
    let session = Arc::new(session?);

    let result = drive(&session, startup, config, cancel, input, out, make_agent).await;

    match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
        Ok(Ok(())) => tracing::debug!("MCP session closed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to close MCP session"),
        Err(_) => tracing::warn!("timed out closing MCP session"),
    }

    result
}

async fn drive<I, W, F>(
    session: &Arc<McpSession>,
    startup: &StartupConfig,
    config: &Config,
    cancel: &CancellationToken,
    input: &mut I,
    out: &mut W,
    make_agent: F,
) -> Result<LoopExit>
where
    I: LineInput + ?Sized,
    W: Write,
    F: FnOnce(&str, ToolRegistry, &Config) -> Result<Box<dyn ConversationAgent>>,
{
    let Some(tools) = until_cancelled(cancel, load_mcp_tools(session)).await else {
        writeln!(out, "{}", FAREWELL)?;
        return Ok(LoopExit::Interrupted);
    };
    let tools = tools.context("failed to load tools from the MCP server")?;

    let agent = make_agent(&startup.llm_model, ToolRegistry::new(tools), config)?;

    repl::run_loop(input, agent.as_ref(), out, cancel).await
}

/// Parse flags, resolve configuration and run one interactive session.
pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    let startup = match config::resolve(
        args.startup_args(),
        &config.defaults,
        std::env::var(BEARER_TOKEN_ENV).ok(),
    ) {
        Ok(startup) => startup,
        Err(e) => {
            println!("{}", e);
            return Ok(());
        }
    };
    tracing::debug!(?startup, "resolved startup configuration");

    let cancel = install_signal_handlers().context("failed to install signal handlers")?;
    let mut input = open_input().context("failed to start the input reader")?;
    let mut stdout = io::stdout();

    let exit = run_session(&startup, &config, &cancel, &mut input, &mut stdout, build_agent).await?;
    tracing::debug!(?exit, "session finished");

    Ok(())
}
