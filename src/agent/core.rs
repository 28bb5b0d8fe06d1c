use async_trait::async_trait;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::tools::ToolRegistry;
use crate::types::{ConversationState, Message, ToolCall, ToolDefinition};

use super::llm::LlmClient;

/// Anything that turns a conversation into an extended conversation.
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    async fn invoke(&self, state: ConversationState) -> Result<ConversationState, AgentError>;
}

/// Reason-act loop: ask the model, run the tools it asks for, repeat until
/// it answers without tool calls.
pub struct ReactAgent {
    llm: Box<dyn LlmClient>,
    tools: ToolRegistry,
    definitions: Vec<ToolDefinition>,
    config: AgentConfig,
}

impl ReactAgent {
    pub fn new(llm: Box<dyn LlmClient>, tools: ToolRegistry, config: AgentConfig) -> Self {
        let definitions = tools.definitions();
        ReactAgent {
            llm,
            tools,
            definitions,
            config,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn request_messages(&self, state: &ConversationState) -> Vec<Message> {
        let mut messages = Vec::with_capacity(state.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(state.messages.iter().cloned());
        messages
    }

    async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            tracing::info!(tool = %call.name, args = %call.arguments, "calling tool");

            let content = match self.tools.execute(&call.name, call.arguments.clone()).await {
                Ok(output) => {
                    tracing::debug!(tool = %call.name, bytes = output.len(), "tool succeeded");
                    output
                }
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool failed");
                    format!("Error: {}", e)
                }
            };

            results.push(Message::tool_result(call, content));
        }

        results
    }
}

#[async_trait]
impl ConversationAgent for ReactAgent {
    async fn invoke(&self, mut state: ConversationState) -> Result<ConversationState, AgentError> {
        let max_iterations = self.config.max_iterations;

        for iteration in 1..=max_iterations {
            tracing::debug!(iteration, max_iterations, "agent step");

            let reply = self
                .llm
                .chat(&self.request_messages(&state), &self.definitions)
                .await?;

            let done = reply.tool_calls.is_empty();
            state.push(Message::assistant(reply.content, reply.tool_calls.clone()));

            if done {
                return Ok(state);
            }

            for message in self.execute_tool_calls(&reply.tool_calls).await {
                state.push(message);
            }
        }

        Err(AgentError::IterationLimit(max_iterations))
    }
}
