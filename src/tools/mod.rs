//! Tools the agent exposes to the model.
//!
//! [`SqlToolkit`] executes tool calls against the meal database and always
//! answers with a tool message carrying the call's id; failures are written
//! into that message so the model can correct itself.

mod query;

pub use query::{run_query, statement_kind, NO_ROWS_MESSAGE};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::DatabaseClient;
use crate::error::{AssistantError, Result};
use crate::llm::tools::{
    QueryToolInput, SchemaToolInput, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL,
    SUBMIT_FINAL_ANSWER_TOOL,
};
use crate::llm::types::{Message, ToolCall};

/// Sample rows shown per table by the schema tool.
const SAMPLE_ROWS: usize = 3;

/// Formats a tool failure the way the model is asked to recover from.
pub fn tool_error_content(error: &AssistantError) -> String {
    format!("Error: {error}\n请修正您的错误。")
}

/// Executes the SQL tools against an injected database.
#[derive(Clone)]
pub struct SqlToolkit {
    db: Arc<dyn DatabaseClient>,
    allow_schema_changes: bool,
}

impl SqlToolkit {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self {
            db,
            allow_schema_changes: false,
        }
    }

    pub fn with_schema_changes(mut self, allow: bool) -> Self {
        self.allow_schema_changes = allow;
        self
    }

    /// Executes one tool call. Never fails.
    pub async fn execute(&self, call: &ToolCall) -> Message {
        debug!(tool = %call.name, id = %call.id, "Executing tool");

        let content = match self.dispatch(call).await {
            Ok(content) => content,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                tool_error_content(&e)
            }
        };

        Message::tool(&call.id, &call.name, content)
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<String> {
        match call.name.as_str() {
            LIST_TABLES_TOOL => self.list_tables().await,
            SCHEMA_TOOL => {
                let input: SchemaToolInput = call.parse_arguments()?;
                self.describe_tables(&input.tables()).await
            }
            QUERY_TOOL => {
                let input: QueryToolInput = call.parse_arguments()?;
                run_query(self.db.as_ref(), &input.query, self.allow_schema_changes).await
            }
            SUBMIT_FINAL_ANSWER_TOOL => Err(AssistantError::internal(
                "SubmitFinalAnswer carries the answer and cannot be executed",
            )),
            other => Err(AssistantError::internal(format!("Unknown tool: {other}"))),
        }
    }

    async fn list_tables(&self) -> Result<String> {
        Ok(self.db.list_tables().await?.join(", "))
    }

    async fn describe_tables(&self, names: &[&str]) -> Result<String> {
        if names.is_empty() {
            return Err(AssistantError::query("No table names given"));
        }

        let schema = self.db.introspect_schema().await?;
        let unknown: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| schema.table(name).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(AssistantError::query(format!(
                "table_names {{{}}} not found in database",
                unknown.join(", ")
            )));
        }

        let mut out = String::new();
        for name in names {
            let ddl = schema.table_ddl(name).unwrap_or_default();
            let sample = self.db.sample_rows(name, SAMPLE_ROWS).await?;
            out.push_str(&format!(
                "\n{ddl}\n\n/*\n{} rows from {} table:\n{}\n*/\n",
                sample.row_count,
                name,
                sample.to_tsv()
            ));
        }

        Ok(out)
    }
}
