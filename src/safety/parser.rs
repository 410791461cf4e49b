//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the SQLite dialect to parse SQL and classify
//! statements by their safety level.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use super::{ClassificationResult, SafetyLevel, StatementType};

/// SQL classifier that parses and classifies SQL statements.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: SQLiteDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a new SQL classifier.
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Classifies a SQL string.
    ///
    /// Returns `None` when the SQL cannot be parsed; SQLite is left to
    /// report the real error.
    pub fn classify(&self, sql: &str) -> Option<ClassificationResult> {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                debug!("SQL not parseable by classifier: {e}");
                return None;
            }
        };

        let mut classified = statements.iter().map(classify_statement);
        let first = classified.next()?;

        if statements.len() == 1 {
            return Some(ClassificationResult::new(first.0, first.1));
        }

        // Multiple statements: use the most dangerous classification
        let (level, stmt_type) =
            classified.fold(first, |max, next| if next.0 > max.0 { next } else { max });
        Some(ClassificationResult::new(
            level,
            StatementType::Multiple(Box::new(stmt_type)),
        ))
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> Option<ClassificationResult> {
    SqlClassifier::new().classify(sql)
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> (SafetyLevel, StatementType) {
    match statement {
        Statement::Query(query) => classify_query(query),
        Statement::Explain { .. } | Statement::ExplainTable { .. } => {
            (SafetyLevel::ReadOnly, StatementType::Explain)
        }
        Statement::Pragma { value, .. } => {
            // `PRAGMA x = y` writes a setting; bare `PRAGMA x` reads it
            let level = if value.is_some() {
                SafetyLevel::Mutating
            } else {
                SafetyLevel::ReadOnly
            };
            (level, StatementType::Pragma)
        }

        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Delete(_) => (SafetyLevel::Mutating, StatementType::Delete),
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateVirtualTable { .. } => (SafetyLevel::Mutating, StatementType::Create),

        Statement::Drop { .. } => (SafetyLevel::SchemaChange, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::SchemaChange, StatementType::Truncate),
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. } => (SafetyLevel::SchemaChange, StatementType::Alter),

        _ => (SafetyLevel::Mutating, StatementType::Unknown),
    }
}

/// Classifies a query, looking into CTE bodies for data-modifying statements.
fn classify_query(query: &Query) -> (SafetyLevel, StatementType) {
    let body = classify_set_expr(&query.body);

    query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| classify_query(&cte.query))
        .fold(body, |max, next| if next.0 > max.0 { next } else { max })
}

fn classify_set_expr(set_expr: &SetExpr) -> (SafetyLevel, StatementType) {
    match set_expr {
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            let left = classify_set_expr(left);
            let right = classify_set_expr(right);
            if right.0 > left.0 {
                right
            } else {
                left
            }
        }
        _ => (SafetyLevel::ReadOnly, StatementType::Select),
    }
}
