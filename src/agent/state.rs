//! Per-turn conversation state and the updates nodes return.

use serde::Serialize;

use crate::llm::types::{Message, Role, ToolCall};

/// How the classifier routed the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteDecision {
    #[default]
    Unclassified,
    /// Answerable from the meal database alone.
    DatabaseOnly,
    /// Needs the database plus document retrieval.
    DatabaseRetrieval,
}

impl RouteDecision {
    /// Parses the classifier's answer. Anything unrecognised is `Unclassified`.
    pub fn parse(text: &str) -> Self {
        let label = text
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '。')
            .to_lowercase();

        match label.as_str() {
            "only_db" | "database-only" => Self::DatabaseOnly,
            "db_rag" | "database+retrieval" => Self::DatabaseRetrieval,
            _ => Self::Unclassified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "unclassified",
            Self::DatabaseOnly => "database-only",
            Self::DatabaseRetrieval => "database+retrieval",
        }
    }
}

/// One SQL statement run during the turn, tied to the call that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlExecution {
    #[serde(skip)]
    pub tool_call_id: String,
    pub sql: String,
    pub result: String,
}

impl SqlExecution {
    pub fn new(
        tool_call_id: impl Into<String>,
        sql: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            sql: sql.into(),
            result: result.into(),
        }
    }
}

/// The record threaded through every node of one turn.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub user_name: String,
    pub request: String,
    pub route_decision: RouteDecision,
    pub table_list_result: Option<String>,
    pub schema_result: Option<String>,
    pub sql_execution_log: Vec<SqlExecution>,
    pub messages: Vec<Message>,
}

impl ConversationState {
    /// Fresh state for a turn.
    pub fn new(request: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            request: request.into(),
            ..Self::default()
        }
    }

    /// Merges a node's update. Lists append, scalars overwrite when present.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(user_name) = update.user_name {
            self.user_name = user_name;
        }
        if let Some(decision) = update.route_decision {
            self.route_decision = decision;
        }
        if let Some(result) = update.table_list_result {
            self.table_list_result = Some(result);
        }
        if let Some(result) = update.schema_result {
            self.schema_result = Some(result);
        }
        self.sql_execution_log.extend(update.sql_executions);
        self.messages.extend(update.messages);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Name of the first tool the last message asks for.
    pub fn last_requested_tool(&self) -> Option<&str> {
        self.last_message()
            .and_then(Message::first_tool_call)
            .map(|call| call.name.as_str())
    }

    /// Tool calls in the history that have no response yet, oldest first.
    pub fn unanswered_tool_calls(&self) -> Vec<&ToolCall> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter())
            .filter(|call| !self.is_answered(&call.id))
            .collect()
    }

    fn is_answered(&self, call_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call_id))
    }
}

/// Partial state produced by a node.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub user_name: Option<String>,
    pub route_decision: Option<RouteDecision>,
    pub table_list_result: Option<String>,
    pub schema_result: Option<String>,
    pub sql_executions: Vec<SqlExecution>,
    pub messages: Vec<Message>,
}

impl StateUpdate {
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Self::default()
        }
    }

    pub fn route(decision: RouteDecision) -> Self {
        Self {
            route_decision: Some(decision),
            ..Self::default()
        }
    }
}

/// What a turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub user_name: String,
    pub message: String,
}

impl TurnOutcome {
    pub fn new(user_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            message: message.into(),
        }
    }
}
