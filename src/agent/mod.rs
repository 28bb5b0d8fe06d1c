pub mod core;
pub mod llm;
pub mod providers;

pub use self::core::{ConversationAgent, ReactAgent};
pub use llm::{build_client, LlmClient, LlmReply, ModelSpec, Provider, RetryingClient};
