//! SQL safety classification.
//!
//! Parses model-generated SQL and classifies it so the query tool can refuse
//! statements that would destroy schema.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use std::fmt;

/// Safety level classification for SQL statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SafetyLevel {
    /// Read-only statements (SELECT, EXPLAIN).
    ReadOnly,
    /// Row-level changes and additive DDL (INSERT, UPDATE, DELETE, CREATE).
    Mutating,
    /// Statements that remove or reshape schema (DROP, ALTER, TRUNCATE).
    SchemaChange,
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "Read-only"),
            Self::Mutating => write!(f, "Mutating"),
            Self::SchemaChange => write!(f, "Schema change"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Explain,
    Pragma,
    /// Multiple statements detected; contains the most dangerous type.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Pragma => write!(f, "PRAGMA"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The most dangerous level among the statements.
    pub level: SafetyLevel,
    /// The type of statement(s) detected.
    pub statement_type: StatementType,
}

impl ClassificationResult {
    pub fn new(level: SafetyLevel, statement_type: StatementType) -> Self {
        Self {
            level,
            statement_type,
        }
    }

    /// Returns true if the statement must be refused under the given policy.
    pub fn is_blocked(&self, allow_schema_changes: bool) -> bool {
        self.level == SafetyLevel::SchemaChange && !allow_schema_changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_level_ordering() {
        assert!(SafetyLevel::ReadOnly < SafetyLevel::Mutating);
        assert!(SafetyLevel::Mutating < SafetyLevel::SchemaChange);
    }

    #[test]
    fn test_statement_type_display() {
        assert_eq!(StatementType::Select.to_string(), "SELECT");
        assert_eq!(
            StatementType::Multiple(Box::new(StatementType::Drop)).to_string(),
            "Multiple (DROP)"
        );
    }

    #[test]
    fn test_is_blocked_respects_policy() {
        let drop = ClassificationResult::new(SafetyLevel::SchemaChange, StatementType::Drop);
        assert!(drop.is_blocked(false));
        assert!(!drop.is_blocked(true));

        let insert = ClassificationResult::new(SafetyLevel::Mutating, StatementType::Insert);
        assert!(!insert.is_blocked(false));
    }
}
