//! OpenAI-compatible LLM client implementation.
//!
//! Implements the LlmClient trait for chat-completions endpoints that follow
//! the OpenAI wire format, including DashScope's compatible mode (Qwen).

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{LlmConfig, DEFAULT_BASE_URL};
use crate::error::{AssistantError, Result};
use crate::llm::tools::{ToolChoice, ToolDefinition};
use crate::llm::types::{LlmResponse, Message, ToolCall};
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum number of retry attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// OpenAI-compatible client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "qwen-max").
    pub model: String,
    /// Base URL up to and excluding `/chat/completions`.
    pub base_url: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Builds a config from the `[llm]` section and a resolved key.
    pub fn from_llm_config(config: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self::new(api_key, config.model.clone())
            .with_base_url(config.base_url.clone())
            .with_temperature(config.temperature)
            .with_timeout(config.timeout_secs)
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI-compatible LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn request(&self, messages: &[Message], stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: self.config.temperature,
            stream,
            tools: None,
            tool_choice: None,
        }
    }

    /// Converts internal messages to OpenAI API format.
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
                tool_calls: (!m.tool_calls.is_empty()).then(|| {
                    m.tool_calls
                        .iter()
                        .map(|tc| OpenAiToolCall {
                            id: tc.id.clone(),
                            kind: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id.clone(),
                name: m.name.clone(),
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|t| OpenAiTool {
                kind: "function".to_string(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn convert_tool_choice(choice: &ToolChoice) -> serde_json::Value {
        match choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::Required => serde_json::json!("required"),
            ToolChoice::Tool(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (AssistantError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                AssistantError::llm("Authentication failed. Check your API key."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (
                AssistantError::llm("Rate limited. Please wait and try again."),
                true,
            );
        }

        // 5xx errors are generally retryable
        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return (
                AssistantError::llm(format!("LLM API error: {}", error_response.error.message)),
                is_retryable,
            );
        }

        (
            AssistantError::llm(format!("LLM API error ({}): {}", status, body)),
            is_retryable,
        )
    }

    /// Determines if a request error is retryable.
    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }

    fn map_request_error(error: &reqwest::Error) -> AssistantError {
        if error.is_timeout() {
            AssistantError::llm("Request timed out. Try again.")
        } else if error.is_connect() {
            AssistantError::llm("Failed to connect to the LLM API. Check your network.")
        } else {
            AssistantError::llm(format!("Request failed: {}", error))
        }
    }

    /// Sends a buffered request, retrying transient failures with backoff.
    async fn send_with_retry(&self, request: &OpenAiRequest) -> Result<OpenAiResponse> {
        let url = self.config.completions_url();
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let start = Instant::now();

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(attempt, model = %self.config.model, "LLM API request");

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        AssistantError::llm(format!("Failed to read response: {}", e))
                    })?;

                    if status.is_success() {
                        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "LLM API response");
                        return serde_json::from_str(&body).map_err(|e| {
                            AssistantError::llm(format!("Failed to parse response: {}", e))
                        });
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(attempt, ?delay, %status, "LLM API request failed, retrying");
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable_request_error(&e);
                    last_error = Some(Self::map_request_error(&e));

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(attempt, ?delay, "LLM API request failed, retrying");
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2; // Exponential backoff
        }

        Err(last_error.unwrap_or_else(|| AssistantError::llm("LLM request was not attempted")))
    }

    fn first_message(response: OpenAiResponse) -> Result<OpenAiResponseMessage> {
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AssistantError::llm("No response from the LLM API"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = self.request(messages, false);
        let message = Self::first_message(self.send_with_retry(&request).await?)?;
        Ok(message.content.unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
    ) -> Result<BoxStream<'static, Result<String>>> {
        let request = self.request(messages, true);

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::map_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let (error, _) = Self::parse_error(status, &body);
            return Err(error);
        }

        // A trailing `None` marks the end of the body so the decoder can flush.
        let parsed_stream = response
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::once(futures::future::ready(None)))
            .scan(SseDecoder::default(), |decoder, item| {
                let result = match item {
                    Some(Ok(bytes)) => Ok(decoder.push(&bytes)),
                    Some(Err(e)) => Err(AssistantError::llm(format!("Stream error: {}", e))),
                    None => Ok(decoder.finish()),
                };
                futures::future::ready(Some(result))
            })
            .filter_map(|result| async move {
                match result {
                    Ok(Some(content)) => Some(Ok(content)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(parsed_stream.boxed())
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        choice: &ToolChoice,
    ) -> Result<LlmResponse> {
        let mut request = self.request(messages, false);
        if !tools.is_empty() {
            request.tools = Some(Self::convert_tools(tools));
            request.tool_choice = Some(Self::convert_tool_choice(choice));
        }

        let message = Self::first_message(self.send_with_retry(&request).await?)?;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(LlmResponse::with_tool_calls(
            message.content.unwrap_or_default(),
            tool_calls,
        ))
    }
}

/// Reassembles Server-Sent Events lines from raw body chunks.
///
/// Bytes are buffered until a newline arrives, so a multi-byte character
/// split across network chunks is decoded whole. `\n` never occurs inside a
/// UTF-8 sequence, which makes every complete line valid on its own.
#[derive(Debug, Default)]
struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Buffers `bytes` and returns the text carried by any completed lines.
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let end = self.pending.iter().rposition(|&b| b == b'\n')?;
        let complete: Vec<u8> = self.pending.drain(..=end).collect();
        parse_sse_chunk(&String::from_utf8_lossy(&complete))
    }

    /// Decodes whatever is left once the body ends without a final newline.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        parse_sse_chunk(&String::from_utf8_lossy(&rest))
    }
}

/// Extracts the text deltas from complete Server-Sent Events lines.
fn parse_sse_chunk(chunk: &str) -> Option<String> {
    let mut content = String::new();

    for line in chunk.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with(':') || line == "data: [DONE]" {
            continue;
        }

        if let Some(data) = line.strip_prefix("data:") {
            if let Ok(event) = serde_json::from_str::<OpenAiStreamEvent>(data.trim()) {
                if let Some(delta) = event.choices.first().and_then(|c| c.delta.content.as_ref()) {
                    content.push_str(delta);
                }
            }
        }
    }

    (!content.is_empty()).then_some(content)
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamEvent {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
