//! Database layer for the meal assistant.
//!
//! Provides the SQLite meal database, its record accessors, and a
//! trait-based interface the agent's SQL tools run against.

pub mod meals;
mod migrations;
mod mock;
mod schema;
mod sqlite;
mod types;
pub mod users;

pub use mock::FailingDatabaseClient;
pub use schema::{Column, ForeignKey, Schema, Table};
pub use sqlite::MealDb;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::error::Result;
use async_trait::async_trait;

/// Trait defining the interface the SQL tools use.
///
/// All database operations are async and return Results with AssistantError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Lists user-visible tables, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Introspects the database schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Returns up to `limit` rows from `table`.
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult>;

    /// Executes a row-returning SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Executes a data-modifying statement and returns the number of affected rows.
    async fn execute_statement(&self, sql: &str) -> Result<u64>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
