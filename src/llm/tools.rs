//! LLM tool definitions for function calling.
//!
//! Declares the SQL tools and the final-answer tool the agent binds to its
//! model calls, plus the typed inputs their arguments decode into.

use serde::{Deserialize, Serialize};

/// Lists the tables in the meal database.
pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
/// Describes the named tables.
pub const SCHEMA_TOOL: &str = "sql_db_schema";
/// Runs one SQL statement.
pub const QUERY_TOOL: &str = "db_query_tool";
/// Carries the final answer back to the caller; never executed.
pub const SUBMIT_FINAL_ANSWER_TOOL: &str = "SubmitFinalAnswer";

/// Tool definition for LLM function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model may use the bound tools.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides.
    #[default]
    Auto,
    /// The model must call one of the tools.
    Required,
    /// The model must call the named tool.
    Tool(String),
}

/// A set of tools bound to a single model call.
#[derive(Debug, Clone, Default)]
pub struct ToolBinding {
    pub tools: Vec<ToolDefinition>,
    pub choice: ToolChoice,
}

impl ToolBinding {
    /// Binds tools the model must use.
    pub fn required(tools: Vec<ToolDefinition>) -> Self {
        Self {
            tools,
            choice: ToolChoice::Required,
        }
    }

    /// Binds a single tool and forces the model to call it.
    pub fn forced(tool: ToolDefinition) -> Self {
        let choice = ToolChoice::Tool(tool.name.clone());
        Self {
            tools: vec![tool],
            choice,
        }
    }
}

/// Input for the schema tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaToolInput {
    /// Comma-separated table names.
    pub table_names: String,
}

impl SchemaToolInput {
    /// Splits the comma-separated list, dropping blanks.
    pub fn tables(&self) -> Vec<&str> {
        self.table_names
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Input for the query tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryToolInput {
    pub query: String,
}

/// Input for the final-answer tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitFinalAnswerInput {
    #[serde(default)]
    pub final_answer: FinalAnswer,
}

/// The answer the model hands back at the end of a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn list_tables_tool() -> ToolDefinition {
    ToolDefinition {
        name: LIST_TABLES_TOOL.to_string(),
        description: "Input is an empty string, output is a comma-separated list of tables in \
                      the database."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
    }
}

pub fn schema_tool() -> ToolDefinition {
    ToolDefinition {
        name: SCHEMA_TOOL.to_string(),
        description: "Input to this tool is a comma-separated list of tables, output is the \
                      schema and sample rows for those tables. Be sure that the tables actually \
                      exist by calling sql_db_list_tables first! Example Input: table1, table2"
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "table_names": {
                    "type": "string",
                    "description": "A comma-separated list of the table names for which to return the schema"
                }
            },
            "required": ["table_names"]
        }),
    }
}

pub fn query_tool() -> ToolDefinition {
    ToolDefinition {
        name: QUERY_TOOL.to_string(),
        description: "Execute a SQL statement against the meal database and get back the result. \
                      SELECT returns the matching rows; other statements report the number of \
                      affected rows. If the statement is incorrect, an error message is returned; \
                      rewrite the statement and try again."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A single SQLite statement"
                }
            },
            "required": ["query"]
        }),
    }
}

pub fn submit_final_answer_tool() -> ToolDefinition {
    ToolDefinition {
        name: SUBMIT_FINAL_ANSWER_TOOL.to_string(),
        description: "Submit the final answer to the user based on the query results.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "final_answer": {
                    "type": "object",
                    "description": "The final answer to the user",
                    "properties": {
                        "user_name": { "type": "string" },
                        "message": { "type": "string" }
                    }
                }
            },
            "required": ["final_answer"]
        }),
    }
}
