//! LLM invocation adapter.
//!
//! Every model call the workflow makes goes through [`LlmInvoker`]: it sends
//! the rendered prompt, optionally with bound tools, and hands back exactly
//! one assistant message. Free-text calls may be buffered or streamed, and a
//! suspiciously short free-text answer is asked for once more.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::tools::ToolBinding;
use crate::llm::types::Message;
use crate::llm::LlmClient;
use crate::logging::TranscriptLog;

/// Free-text calls are attempted at most this many times.
const MAX_FREE_TEXT_ATTEMPTS: usize = 2;

/// How free-text responses are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// One request, one complete body.
    Buffered,
    /// Fragments are concatenated as they arrive.
    #[default]
    Incremental,
}

impl DeliveryMode {
    pub fn from_streaming(streaming: bool) -> Self {
        if streaming {
            Self::Incremental
        } else {
            Self::Buffered
        }
    }
}

/// Sends rendered prompts to the model.
#[derive(Clone)]
pub struct LlmInvoker {
    client: Arc<dyn LlmClient>,
    mode: DeliveryMode,
    min_answer_chars: usize,
    transcript: Option<Arc<TranscriptLog>>,
}

impl LlmInvoker {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            mode: DeliveryMode::default(),
            min_answer_chars: 6,
            transcript: None,
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Free-text answers with fewer characters than this are regenerated once.
    pub fn with_min_answer_chars(mut self, min_answer_chars: usize) -> Self {
        self.min_answer_chars = min_answer_chars;
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<TranscriptLog>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Invokes the model and returns its reply as an assistant message.
    ///
    /// Tool-bound calls are always buffered.
    pub async fn invoke(&self, messages: &[Message], binding: Option<&ToolBinding>) -> Result<Message> {
        match binding {
            Some(binding) => self.invoke_with_tools(messages, binding).await,
            None => self.invoke_free_text(messages).await,
        }
    }

    async fn invoke_with_tools(&self, messages: &[Message], binding: &ToolBinding) -> Result<Message> {
        let start = Instant::now();
        let response = self
            .client
            .complete_with_tools(messages, &binding.tools, &binding.choice)
            .await?;

        info!(
            tools = binding.tools.len(),
            tool_calls = response.tool_calls.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "LLM tool call completed"
        );

        let message = response.into_message();
        self.record(messages, &describe_response(&message));
        Ok(message)
    }

    async fn invoke_free_text(&self, messages: &[Message]) -> Result<Message> {
        let mut answer = String::new();

        for attempt in 1..=MAX_FREE_TEXT_ATTEMPTS {
            let start = Instant::now();
            answer = match self.mode {
                DeliveryMode::Buffered => self.client.complete(messages).await?,
                DeliveryMode::Incremental => self.drain_stream(messages).await?,
            };
            self.record(messages, &answer);

            let chars = answer.chars().count();
            info!(
                attempt,
                mode = ?self.mode,
                chars,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "LLM completion finished"
            );

            if chars >= self.min_answer_chars {
                break;
            }
            if attempt < MAX_FREE_TEXT_ATTEMPTS {
                warn!(chars, "LLM answer too short, asking again");
            }
        }

        Ok(Message::assistant(answer))
    }

    async fn drain_stream(&self, messages: &[Message]) -> Result<String> {
        let mut stream = self.client.complete_stream(messages).await?;
        let mut text = String::new();
        let mut fragments = 0usize;

        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
            fragments += 1;
        }

        debug!(fragments, "Stream drained");
        Ok(text)
    }

    fn record(&self, messages: &[Message], response: &str) {
        if let Some(transcript) = &self.transcript {
            let prompt = messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect::<Vec<_>>()
                .join("\n");
            transcript.record(&prompt, response);
        }
    }
}

fn describe_response(message: &Message) -> String {
    let calls = message
        .tool_calls
        .iter()
        .map(|tc| format!("tool_call {} {}({})", tc.id, tc.name, tc.arguments))
        .collect::<Vec<_>>();

    match (message.content.is_empty(), calls.is_empty()) {
        (_, true) => message.content.clone(),
        (true, false) => calls.join("\n"),
        (false, false) => format!("{}\n{}", message.content, calls.join("\n")),
    }
}
