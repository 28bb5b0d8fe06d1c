mod anthropic;
mod google;
mod ollama;
mod openai;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
