pub mod mcp_tool;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::types::ToolDefinition;

pub use mcp_tool::{load_mcp_tools, McpTool};
pub use registry::ToolRegistry;

/// A callable tool: its schema plus a way to invoke it.
#[async_trait]
pub trait ToolHandle: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    async fn call(&self, arguments: Value) -> Result<String, ToolError>;
}
