//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};

/// Creates an LLM client from the `[llm]` configuration.
///
/// The API key is resolved in order:
/// 1. `llm.api_key` in the config file
/// 2. `MEAL_ASSISTANT_API_KEY`, `DASHSCOPE_API_KEY`, `OPENAI_API_KEY`
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse()?;

    match provider {
        LlmProvider::OpenAi => {
            let key = config.resolve_api_key().ok_or_else(|| {
                AssistantError::config(
                    "No API key configured. Set llm.api_key or DASHSCOPE_API_KEY.",
                )
            })?;
            let client = OpenAiClient::new(OpenAiConfig::from_llm_config(config, key))?;
            Ok(Arc::new(client))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
