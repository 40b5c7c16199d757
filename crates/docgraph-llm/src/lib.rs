pub mod provider;
pub mod scripted;
pub mod tokens;
pub mod types;

pub use provider::LlmProvider;
pub use scripted::ScriptedLlm;
pub use tokens::estimate_tokens;
pub use types::{GenerationConfig, LlmResponse, LlmUsage, Message, MessageRole};
