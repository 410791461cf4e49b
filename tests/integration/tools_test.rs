//! Integration tests for the SQL tools against a real meal database.

use meal_assistant::db::{users, DatabaseClient};
use meal_assistant::llm::tools::{LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL};
use meal_assistant::llm::types::{Role, ToolCall};
use meal_assistant::tools::{SqlToolkit, NO_ROWS_MESSAGE};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::create_test_db;

fn query(sql: &str) -> ToolCall {
    ToolCall::new("call_q", QUERY_TOOL, json!({ "query": sql }))
}

#[tokio::test]
async fn test_list_tables() {
    let (db, _dir) = create_test_db().await;
    let toolkit = SqlToolkit::new(db);

    let message = toolkit
        .execute(&ToolCall::new("tool_abcd123", LIST_TABLES_TOOL, json!({})))
        .await;

    assert_eq!(message.role, Role::Tool);
    assert_eq!(message.tool_call_id.as_deref(), Some("tool_abcd123"));
    assert_eq!(message.content, "food_categories, meals, users");
}

#[tokio::test]
async fn test_schema_includes_sample_rows() {
    let (db, _dir) = create_test_db().await;
    let toolkit = SqlToolkit::new(db);

    let message = toolkit
        .execute(&ToolCall::new(
            "s",
            SCHEMA_TOOL,
            json!({ "table_names": "food_categories, meals" }),
        ))
        .await;

    assert!(message.content.contains("food_categories"));
    assert!(message.content.contains("meal_type"));
    assert!(message.content.contains("3 rows from food_categories table:"));
    assert!(message.content.contains("蔬菜类"));
    assert!(message.content.contains("0 rows from meals table:"));
    assert!(!message.content.contains("Error:"));
}

#[tokio::test]
async fn test_schema_for_unknown_table_is_error_message() {
    let (db, _dir) = create_test_db().await;
    let toolkit = SqlToolkit::new(db);

    let message = toolkit
        .execute(&ToolCall::new("s", SCHEMA_TOOL, json!({ "table_names": "meals, dishes" })))
        .await;

    assert!(message.content.starts_with("Error: "));
    assert!(message.content.contains("dishes"));
    assert!(message.content.ends_with("\n请修正您的错误。"));
}

#[tokio::test]
async fn test_select_returns_rows_or_empty_message() {
    let (db, _dir) = create_test_db().await;
    users::register_user(db.pool(), "小明").await.unwrap();
    let toolkit = SqlToolkit::new(db);

    let rows = toolkit
        .execute(&query("SELECT user_id, user_name FROM users"))
        .await;
    assert_eq!(rows.content, r#"[[1,"小明"]]"#);

    let empty = toolkit
        .execute(&query("SELECT * FROM meals WHERE user_id = 1"))
        .await;
    assert_eq!(empty.content, NO_ROWS_MESSAGE);
}

#[tokio::test]
async fn test_statements_commit_and_report_affected_rows() {
    let (db, _dir) = create_test_db().await;
    users::register_user(db.pool(), "小明").await.unwrap();
    let toolkit = SqlToolkit::new(db.clone());

    let insert = toolkit
        .execute(&query(
            "INSERT INTO meals (user_id, meal_type, food_name, meal_date) \
             VALUES (1, 'snack', '苹果', '2025-03-12')",
        ))
        .await;
    assert_eq!(insert.content, "message: INSERT 成功，受影响行数: 1");

    let update = toolkit
        .execute(&query("update meals set food_name = '青苹果' where user_id = 1"))
        .await;
    assert_eq!(update.content, "message: UPDATE 成功，受影响行数: 1");

    let stored = db
        .execute_query("SELECT food_name FROM meals")
        .await
        .unwrap();
    assert_eq!(stored.rows_as_json(), r#"[["青苹果"]]"#);
}

#[tokio::test]
async fn test_syntax_error_is_reported_as_result() {
    let (db, _dir) = create_test_db().await;
    let toolkit = SqlToolkit::new(db);

    let message = toolkit.execute(&query("SELEC * FORM meals")).await;

    assert!(message.content.starts_with("message: SQL 执行失败，错误信息: "));
    assert!(message.content.contains("syntax error"));
}

#[tokio::test]
async fn test_constraint_violation_is_reported_as_result() {
    let (db, _dir) = create_test_db().await;
    let toolkit = SqlToolkit::new(db);

    let message = toolkit
        .execute(&query(
            "INSERT INTO meals (user_id, meal_type, food_name) VALUES (1, 'brunch', '面包')",
        ))
        .await;

    assert!(message.content.starts_with("message: SQL 执行失败"));
}

#[tokio::test]
async fn test_drop_is_refused_unless_allowed() {
    let (db, _dir) = create_test_db().await;

    let refused = SqlToolkit::new(db.clone())
        .execute(&query("DROP TABLE meals"))
        .await;
    assert!(refused.content.starts_with("Error: "));
    assert!(refused.content.contains("DROP statements are not allowed"));
    assert!(db.list_tables().await.unwrap().contains(&"meals".to_string()));

    let allowed = SqlToolkit::new(db.clone())
        .with_schema_changes(true)
        .execute(&query("DROP TABLE meals"))
        .await;
    assert!(allowed.content.starts_with("message: DROP 成功，受影响行数: "));
    assert!(!db.list_tables().await.unwrap().contains(&"meals".to_string()));
}

#[tokio::test]
async fn test_empty_query_asks_for_correction() {
    let (db, _dir) = create_test_db().await;
    let toolkit = SqlToolkit::new(db);

    let message = toolkit.execute(&query("  ")).await;

    assert_eq!(message.tool_call_id.as_deref(), Some("call_q"));
    assert!(message.content.starts_with("Error: "));
    assert!(message.content.contains("The query is empty"));
    assert!(message.content.ends_with("\n请修正您的错误。"));
}
