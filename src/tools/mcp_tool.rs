use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{McpError, ToolError};
use crate::mcp::{McpSession, McpToolDefinition};
use crate::types::ToolDefinition;

use super::ToolHandle;

/// A tool exposed by the MCP server, invoked through the shared session.
pub struct McpTool {
    definition: ToolDefinition,
    session: Arc<McpSession>,
}

impl McpTool {
    pub fn new(definition: McpToolDefinition, session: Arc<McpSession>) -> Self {
        McpTool {
            definition: ToolDefinition {
                description: definition.description.unwrap_or_default(),
                name: definition.name,
                parameters: definition.input_schema,
            },
            session,
        }
    }
}

#[async_trait]
impl ToolHandle for McpTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let result = self
            .session
            .call_tool(&self.definition.name, arguments)
            .await?;
        let text = result.to_text();

        if result.is_error {
            return Err(ToolError::Failed {
                name: self.definition.name.clone(),
                message: text,
            });
        }
        Ok(text)
    }
}

/// Fetch the server's tools once; an empty list is not an error.
pub async fn load_mcp_tools(session: &Arc<McpSession>) -> Result<Vec<Arc<dyn ToolHandle>>, McpError> {
    let tools = session
        .list_tools()
        .await?
        .into_iter()
        .map(|def| Arc::new(McpTool::new(def, Arc::clone(session))) as Arc<dyn ToolHandle>)
        .collect::<Vec<_>>();

    tracing::info!(count = tools.len(), "loaded MCP tools");
    Ok(tools)
}
