//! Integration tests for the meal assistant.

pub mod persistence_test;
pub mod session_test;
pub mod tools_test;
pub mod workflow_test;

use meal_assistant::db::MealDb;
use std::sync::Arc;
use tempfile::TempDir;

/// Opens a fresh meal database in a temporary directory.
pub async fn create_test_db() -> (Arc<MealDb>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = MealDb::open(&dir.path().join("meals.db")).await.unwrap();
    (Arc::new(db), dir)
}
