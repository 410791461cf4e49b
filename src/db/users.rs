//! User registration and lookup.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub user_name: String,
}

/// Registers a user and returns the new id.
///
/// Returns `None` when the name is already taken.
pub async fn register_user(pool: &SqlitePool, user_name: &str) -> Result<Option<i64>> {
    let result = sqlx::query("INSERT INTO users (user_name) VALUES (?)")
        .bind(user_name)
        .execute(pool)
        .await;

    match result {
        Ok(done) => Ok(Some(done.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(AssistantError::database(format!(
            "Failed to register user: {e}"
        ))),
    }
}

/// Looks up the id for a user name.
pub async fn find_user_id(pool: &SqlitePool, user_name: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM users WHERE user_name = ?")
        .bind(user_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to look up user: {e}")))?;

    Ok(row.map(|(id,)| id))
}

/// Fetches a user record by name.
pub async fn get_user_by_name(pool: &SqlitePool, user_name: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT user_id, user_name FROM users WHERE user_name = ?")
        .bind(user_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to get user: {e}")))
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
