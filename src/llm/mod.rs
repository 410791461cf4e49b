//! LLM integration for the meal assistant.
//!
//! Provides the model-client trait, an OpenAI-compatible implementation, a
//! scripted mock, prompt templates, and the invocation adapter the workflow
//! calls through.

pub mod factory;
pub mod invoke;
pub mod mock;
pub mod openai;
pub mod prompt;
pub mod tools;
pub mod types;

pub use factory::create_client;
pub use invoke::{DeliveryMode, LlmInvoker};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use prompt::{PromptSet, PromptTemplate};
pub use tools::{ToolBinding, ToolChoice, ToolDefinition};
pub use types::{Conversation, LlmResponse, Message, Role, ToolCall};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::str::FromStr;

use crate::error::{AssistantError, Result};

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    ///
    /// Returns the complete response as a single string.
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Generates a streaming completion for the given messages.
    ///
    /// Returns a stream of response chunks as they arrive.
    async fn complete_stream(
        &self,
        messages: &[Message],
    ) -> Result<BoxStream<'static, Result<String>>>;

    /// Generates a completion with tools bound, honoring `choice`.
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<LlmResponse>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Any OpenAI-compatible chat-completions endpoint (DashScope, OpenAI, ...)
    #[default]
    OpenAi,
    /// Mock client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = AssistantError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "dashscope" | "qwen" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(AssistantError::config(format!("Unknown LLM provider: {s}"))),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
