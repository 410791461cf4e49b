//! Error types for the meal assistant.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for assistant operations.
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Database open/migration/accessor errors.
    #[error("Database error: {0}")]
    Database(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt template errors (missing file, unbound placeholder).
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow failures that end a turn (step cap exceeded, unroutable state).
    #[error("Orchestration error: {0}")]
    Orchestration(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssistantError {
    /// Creates a database error with the given message.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a prompt error with the given message.
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an orchestration error with the given message.
    pub fn orchestration(msg: impl Into<String>) -> Self {
        Self::Orchestration(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Database(_) => "Database Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Prompt(_) => "Prompt Error",
            Self::Config(_) => "Configuration Error",
            Self::Orchestration(_) => "Orchestration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using AssistantError.
pub type Result<T> = std::result::Result<T, AssistantError>;
