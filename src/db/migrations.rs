//! Schema versioning and migrations for the meal database.
//!
//! Manages database schema evolution with forward-only migrations.

use crate::db::meals::DEFAULT_FOOD_CATEGORIES;
use crate::error::{AssistantError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

/// Bookkeeping table; hidden from the model's table listing.
pub const SCHEMA_VERSIONS_TABLE: &str = "schema_versions";

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(AssistantError::database(format!(
            "Database schema version ({}) is newer than supported version ({}). \
             Please upgrade meal-assistant to the latest version.",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating meal database from version {} to {}",
            current, CURRENT_VERSION
        );
        run_pending_migrations(pool, current).await?;
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        AssistantError::database(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

/// Gets the current schema version.
pub async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn run_pending_migrations(pool: &SqlitePool, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=CURRENT_VERSION {
        run_migration(pool, version).await?;
        record_version(pool, version).await?;
        info!("Applied migration v{}", version);
    }
    Ok(())
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(AssistantError::database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: users, food categories and meals, with default categories.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AssistantError::database(format!("Failed to begin migration: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(|e| AssistantError::database(format!("Failed to create users table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS food_categories (
            category_id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_name TEXT NOT NULL UNIQUE,
            nutrition_value TEXT,
            recommended_frequency TEXT
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        AssistantError::database(format!("Failed to create food_categories table: {e}"))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meals (
            meal_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            meal_date DATE DEFAULT CURRENT_DATE,
            meal_type TEXT CHECK(meal_type IN ('breakfast', 'lunch', 'dinner', 'snack')) NOT NULL,
            food_name TEXT NOT NULL,
            category_id INTEGER,
            description TEXT,
            FOREIGN KEY (user_id) REFERENCES users (user_id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES food_categories (category_id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(|e| AssistantError::database(format!("Failed to create meals table: {e}")))?;

    for (name, nutrition, frequency) in DEFAULT_FOOD_CATEGORIES {
        sqlx::query(
            "INSERT OR IGNORE INTO food_categories \
             (category_name, nutrition_value, recommended_frequency) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(nutrition)
        .bind(frequency)
        .execute(&mut *tx)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to seed food categories: {e}")))?;
    }

    tx.commit()
        .await
        .map_err(|e| AssistantError::database(format!("Failed to commit migration: {e}")))?;

    Ok(())
}
