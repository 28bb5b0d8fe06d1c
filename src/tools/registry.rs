use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::types::ToolDefinition;

use super::ToolHandle;

/// Tools bound to an agent, looked up by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolHandle>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn ToolHandle>>) -> Self {
        let mut registry = ToolRegistry::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandle>) {
        let name = tool.definition().name.clone();
        match self.by_name.get(&name) {
            Some(&index) => {
                tracing::warn!(tool = %name, "duplicate tool name, keeping the last definition");
                self.tools[index] = tool;
            }
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Definitions of every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .by_name
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.call(args).await
    }
}
