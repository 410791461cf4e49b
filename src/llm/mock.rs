//! Mock LLM client for testing.
//!
//! Replays scripted responses in order and records every request, so the
//! workflow can be driven deterministically. When the script runs out it
//! falls back to canned responses that walk the database path, which is
//! what the `mock` provider uses interactively.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{AssistantError, Result};
use crate::llm::tools::{
    ToolChoice, ToolDefinition, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL, SUBMIT_FINAL_ANSWER_TOOL,
};
use crate::llm::types::{LlmResponse, Message, Role, ToolCall};
use crate::llm::LlmClient;

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub choice: Option<ToolChoice>,
}

enum Scripted {
    Response(LlmResponse),
    Error(String),
}

/// Mock LLM client that returns scripted responses.
///
/// Used for unit testing without making real API calls.
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_counter: AtomicUsize,
}

impl MockLlmClient {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a plain-text response.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Response(LlmResponse::text(text)))
    }

    /// Queues a response requesting a single tool call.
    pub fn with_tool_call(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        let call = ToolCall::new(id, name, arguments);
        self.push(Scripted::Response(LlmResponse::with_tool_calls("", vec![call])))
    }

    /// Queues a provider failure.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Error(message.into()))
    }

    fn push(self, item: Scripted) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Returns the number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn record(&self, messages: &[Message], tools: &[ToolDefinition], choice: Option<&ToolChoice>) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
                choice: choice.cloned(),
            });
        }
    }

    fn next_scripted(&self) -> Option<Scripted> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }

    fn next_call_id(&self) -> String {
        format!("mock_call_{}", self.call_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Picks the tool a forced call should use: the named one, then the
    /// final-answer tool, then the first bound tool.
    fn target_tool<'a>(tools: &'a [ToolDefinition], choice: &'a ToolChoice) -> Option<&'a str> {
        match choice {
            ToolChoice::Tool(name) => Some(name.as_str()),
            _ => tools
                .iter()
                .find(|t| t.name == SUBMIT_FINAL_ANSWER_TOOL)
                .or_else(|| tools.first())
                .map(|t| t.name.as_str()),
        }
    }

    fn canned_tool_call(&self, name: &str, messages: &[Message]) -> ToolCall {
        let arguments = match name {
            LIST_TABLES_TOOL => serde_json::json!({}),
            SCHEMA_TOOL => serde_json::json!({ "table_names": "meals, food_categories, users" }),
            QUERY_TOOL => serde_json::json!({
                "query": "SELECT meal_date, meal_type, food_name FROM meals ORDER BY meal_date DESC LIMIT 10"
            }),
            SUBMIT_FINAL_ANSWER_TOOL => {
                let prompt = Self::extract_user_input(messages);
                let message = if prompt.contains("登录") {
                    "您好，已为您分配昵称「健康小达人」。"
                } else {
                    "已为您处理完成。"
                };
                let mut answer = serde_json::json!({ "message": message });
                if prompt.contains("登录") {
                    answer["user_name"] = serde_json::json!("健康小达人");
                }
                serde_json::json!({ "final_answer": answer })
            }
            _ => serde_json::json!({}),
        };
        ToolCall::new(self.next_call_id(), name, arguments)
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.record(messages, &[], None);
        match self.next_scripted() {
            Some(Scripted::Response(response)) => Ok(response.content),
            Some(Scripted::Error(message)) => Err(AssistantError::llm(message)),
            None => Ok("only_db".to_string()),
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
    ) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.complete(messages).await?;

        // Simulate streaming by yielding chunks
        let chunks: Vec<String> = response
            .chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect())
            .collect();

        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<LlmResponse> {
        self.record(messages, tools, Some(choice));
        match self.next_scripted() {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Error(message)) => Err(AssistantError::llm(message)),
            None => match Self::target_tool(tools, choice) {
                Some(name) => Ok(LlmResponse::with_tool_calls(
                    "",
                    vec![self.canned_tool_call(name, messages)],
                )),
                None => Ok(LlmResponse::text(Self::extract_user_input(messages))),
            },
        }
    }
}
