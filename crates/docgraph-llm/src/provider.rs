use async_trait::async_trait;
use docgraph_core::Result;

use crate::types::{GenerationConfig, LlmResponse, Message};

/// The contract every backing model implements. Agents never depend on a
/// concrete provider — only on this trait — so swapping in a real hosted
/// model later is a matter of adding another implementation, not touching
/// agent code.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LlmResponse>;

    fn provider_name(&self) -> &str;
    fn model_name(&self) -> &str;

    /// Best-effort, not billed against: used to decide whether a provider is
    /// even worth trying before spending a request budget on it.
    fn is_available(&self) -> bool {
        true
    }
}
