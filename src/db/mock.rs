//! Mock database client for testing.
//!
//! Provides a client whose every operation fails, for exercising the
//! error paths of the SQL tools without a broken database file.

use super::{DatabaseClient, QueryResult, Schema};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;

/// A database client that fails every call with the configured message.
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    /// Creates a failing client.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(AssistantError::database(self.message.clone()))
    }
}

impl Default for FailingDatabaseClient {
    fn default() -> Self {
        Self::new("database is unavailable")
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.fail()
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        self.fail()
    }

    async fn sample_rows(&self, _table: &str, _limit: usize) -> Result<QueryResult> {
        self.fail()
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        self.fail()
    }

    async fn execute_statement(&self, _sql: &str) -> Result<u64> {
        self.fail()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
