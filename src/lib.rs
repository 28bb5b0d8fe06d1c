pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod mcp;
pub mod repl;
pub mod shutdown;
pub mod tools;
pub mod types;

pub use agent::{ConversationAgent, ReactAgent};
pub use cli::{run_cli, run_session};
pub use config::{Config, SessionConfig, StartupConfig};
pub use mcp::McpSession;
