mod function;
mod message;

pub use function::{ToolCall, ToolDefinition};
pub use message::{ConversationState, Message, Role};
