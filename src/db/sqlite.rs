//! SQLite-backed meal database.
//!
//! `MealDb` owns the single-connection pool shared by the accessors and the
//! agent's SQL tools, and implements [`DatabaseClient`] for the latter.

use crate::db::migrations::{self, SCHEMA_VERSIONS_TABLE};
use crate::db::{Column, ColumnInfo, DatabaseClient, ForeignKey, QueryResult, Row, Schema, Table, Value};
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// The meal database.
#[derive(Debug, Clone)]
pub struct MealDb {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl MealDb {
    /// Opens or creates the database at `path` and applies pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        let pool = Self::connect(path).await?;
        migrations::run_migrations(&pool).await?;
        info!(path = %path.display(), "Meal database opened");

        Ok(Self {
            pool,
            db_path: path.to_path_buf(),
        })
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| AssistantError::database(format!("Invalid database path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| AssistantError::database(format!("Failed to open meal database: {e}")))
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AssistantError::database(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_columns(&self, table: &str) -> Result<Table> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to read columns of {table}: {e}")))?;

        let mut result = Table::new(table);
        let mut pk: Vec<(i64, String)> = Vec::new();

        for (name, data_type, not_null, default, pk_index) in rows {
            if pk_index > 0 {
                pk.push((pk_index, name.clone()));
            }
            // INTEGER PRIMARY KEY is the rowid and never NULL
            let nullable = not_null == 0 && pk_index == 0;
            let mut column = Column::new(name, data_type).nullable(nullable);
            if let Some(default) = default {
                column = column.with_default(default);
            }
            result.columns.push(column);
        }

        pk.sort_by_key(|(i, _)| *i);
        result.primary_key = pk.into_iter().map(|(_, name)| name).collect();

        Ok(result)
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AssistantError::database(format!("Failed to read foreign keys of {table}: {e}"))
        })?;

        let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
        for (id, to_table, from, to) in rows {
            let to = to.unwrap_or_else(|| from.clone());
            match keys.iter_mut().find(|(key_id, _)| *key_id == id) {
                Some((_, fk)) => {
                    fk.from_columns.push(from);
                    fk.to_columns.push(to);
                }
                None => keys.push((id, ForeignKey::new(table, vec![from], to_table, vec![to]))),
            }
        }

        Ok(keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

#[async_trait]
impl DatabaseClient for MealDb {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != ? \
             ORDER BY name",
        )
        .bind(SCHEMA_VERSIONS_TABLE)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to list tables: {e}")))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let mut schema = Schema::new();

        for name in self.list_tables().await? {
            schema.tables.push(self.fetch_columns(&name).await?);
            schema
                .foreign_keys
                .extend(self.fetch_foreign_keys(&name).await?);
        }

        debug!(tables = schema.tables.len(), "Introspected schema");
        Ok(schema)
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_identifier(table));
        self.execute_query(&sql).await
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let rows = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            AssistantError::query(format!("Query timed out after {QUERY_TIMEOUT_SECS} seconds"))
        })?
        .map_err(|e| AssistantError::query(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = rows
            .first()
            .map(|first| {
                first
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();

        debug!(rows = rows.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Query executed");
        Ok(QueryResult::with_data(columns, rows))
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        let done = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).execute(&self.pool),
        )
        .await
        .map_err(|_| {
            AssistantError::query(format!(
                "Statement timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| AssistantError::query(format_query_error(e)))?;

        Ok(done.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Decodes a value by its runtime storage class; SQLite columns are not
/// bound to a single type.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "INT8" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
