//! The SQL execution tool.
//!
//! Runs one model-generated statement and renders the outcome as text for
//! the model. Database errors are part of that text; only a refused
//! statement is reported as an error.

use tracing::{info, warn};

use crate::db::DatabaseClient;
use crate::error::{AssistantError, Result};
use crate::safety::classify_sql;

/// Reply for a SELECT that matched nothing.
pub const NO_ROWS_MESSAGE: &str = "message: 没有查询到信息.";

/// Executes `sql` and renders the outcome.
///
/// The statement kind is its first keyword: `SELECT` fetches rows, anything
/// else is executed and reports the affected row count.
pub async fn run_query(
    db: &dyn DatabaseClient,
    sql: &str,
    allow_schema_changes: bool,
) -> Result<String> {
    if sql.trim_matches(|c: char| c.is_whitespace() || c == ';').is_empty() {
        return Err(AssistantError::query(
            "The query is empty. Pass one SQLite statement in `query`",
        ));
    }

    if let Some(classification) = classify_sql(sql) {
        if classification.is_blocked(allow_schema_changes) {
            warn!(statement = %classification.statement_type, "Refused schema change");
            return Err(AssistantError::query(format!(
                "{} statements are not allowed: the schema of the meal database must not change",
                classification.statement_type
            )));
        }
    }

    let kind = statement_kind(sql);

    if kind == "SELECT" {
        return Ok(match db.execute_query(sql).await {
            Ok(result) if result.is_empty() => NO_ROWS_MESSAGE.to_string(),
            Ok(result) => {
                info!(rows = result.row_count, "Query returned rows");
                result.rows_as_json()
            }
            Err(e) => failure_message(&e),
        });
    }

    Ok(match db.execute_statement(sql).await {
        Ok(affected) => {
            info!(kind = %kind, affected, "Statement executed");
            format!("message: {kind} 成功，受影响行数: {affected}")
        }
        Err(e) => failure_message(&e),
    })
}

/// Upper-cased first keyword of the statement.
pub fn statement_kind(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| word.trim_end_matches(';').to_uppercase())
        .unwrap_or_default()
}

fn failure_message(error: &AssistantError) -> String {
    let detail = match error {
        AssistantError::Query(msg) | AssistantError::Database(msg) => msg.clone(),
        other => other.to_string(),
    };
    warn!(error = %detail, "SQL execution failed");
    format!("message: SQL 执行失败，错误信息: {detail}")
}
