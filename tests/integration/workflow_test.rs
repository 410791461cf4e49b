//! End-to-end turns through the orchestration graph with a scripted model.

use std::sync::Arc;

use meal_assistant::agent::{ConversationState, TurnOutcome, Workflow, SEED_CALL_ID};
use meal_assistant::config::Config;
use meal_assistant::db::meals::{self, MealType, NewMeal};
use meal_assistant::db::{users, DatabaseClient, MealDb};
use meal_assistant::llm::tools::{
    ToolChoice, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL, SUBMIT_FINAL_ANSWER_TOOL,
};
use meal_assistant::llm::types::Role;
use meal_assistant::llm::{LlmInvoker, MockLlmClient, PromptSet};
use meal_assistant::logging::TranscriptLog;
use meal_assistant::tools::SqlToolkit;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::create_test_db;

fn workflow(mock: &Arc<MockLlmClient>, db: &Arc<MealDb>) -> Workflow {
    Workflow::new(
        LlmInvoker::new(mock.clone()),
        SqlToolkit::new(db.clone()),
        PromptSet::builtin(),
    )
}

async fn seed_week(db: &MealDb) {
    let user_id = users::register_user(db.pool(), "小明").await.unwrap().unwrap();
    for (meal_type, food) in [(MealType::Breakfast, "燕麦粥"), (MealType::Lunch, "米饭")] {
        meals::add_meal(db.pool(), &NewMeal::new(user_id, meal_type, food))
            .await
            .unwrap();
    }
}

const WEEK_QUERY: &str = "SELECT m.food_name FROM meals m JOIN users u ON m.user_id = u.user_id \
                          WHERE u.user_name = '小明' AND m.meal_date >= date('now', '-7 day') \
                          ORDER BY m.meal_type";

#[tokio::test]
async fn test_anonymous_user_is_named_by_login() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new().with_tool_call(
        "login_1",
        SUBMIT_FINAL_ANSWER_TOOL,
        json!({"final_answer": {"user_name": "苹果爱好者", "message": "已为您创建用户名：苹果爱好者"}}),
    ));

    let outcome = workflow(&mock, &db).run_turn("今天吃了苹果", "").await;

    assert_eq!(
        outcome,
        TurnOutcome::new("苹果爱好者", "已为您创建用户名：苹果爱好者")
    );
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].choice, Some(ToolChoice::Required));
    assert_eq!(
        requests[0].tools,
        vec![LIST_TABLES_TOOL.to_string(), SUBMIT_FINAL_ANSWER_TOOL.to_string()]
    );
    assert!(requests[0].messages[0].content.contains("今天吃了苹果"));
}

#[tokio::test]
async fn test_database_only_request_walks_the_full_path() {
    let (db, _dir) = create_test_db().await;
    seed_week(&db).await;
    let mock = Arc::new(
        MockLlmClient::new()
            .with_text("only_db")
            .with_tool_call("schema_1", SCHEMA_TOOL, json!({"table_names": "meals, users"}))
            .with_tool_call("query_1", QUERY_TOOL, json!({ "query": WEEK_QUERY }))
            .with_tool_call(
                "final_1",
                SUBMIT_FINAL_ANSWER_TOOL,
                json!({"final_answer": {"message": "这周您吃了燕麦粥和米饭。"}}),
            ),
    );

    let state = workflow(&mock, &db)
        .run(ConversationState::new("这周我吃了哪些食物", "小明"))
        .await
        .unwrap();

    let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
        ]
    );
    assert_eq!(state.messages[1].tool_call_id.as_deref(), Some(SEED_CALL_ID));
    assert_eq!(state.messages[3].tool_call_id.as_deref(), Some("schema_1"));
    assert_eq!(state.messages[5].tool_call_id.as_deref(), Some("query_1"));

    assert_eq!(state.sql_execution_log.len(), 1);
    let execution = &state.sql_execution_log[0];
    assert_eq!(execution.tool_call_id, "query_1");
    assert_eq!(execution.sql, WEEK_QUERY);
    assert_eq!(execution.result, r#"[["燕麦粥"],["米饭"]]"#);

    let requests = mock.requests();
    assert_eq!(requests.len(), 4);
    let generate = &requests[2].messages[0].content;
    assert!(generate.contains("food_categories, meals, users"));
    assert!(generate.contains("1 rows from users table:"));
    let conclude = &requests[3].messages[0].content;
    assert!(conclude.contains(r#""result":"[[\"燕麦粥\"],[\"米饭\"]]""#));

    let outcome = meal_assistant::agent::final_outcome(&state);
    assert_eq!(outcome, TurnOutcome::new("小明", "这周您吃了燕麦粥和米饭。"));
}

#[tokio::test]
async fn test_every_tool_call_is_answered_before_conclude() {
    let (db, _dir) = create_test_db().await;
    seed_week(&db).await;
    let mock = Arc::new(MockLlmClient::new().with_text("only_db"));

    let state = workflow(&mock, &db)
        .run(ConversationState::new("这周我吃了哪些食物", "小明"))
        .await
        .unwrap();

    let pending = state.unanswered_tool_calls();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, SUBMIT_FINAL_ANSWER_TOOL);

    for message in state.messages.iter().filter(|m| m.role == Role::Tool) {
        let id = message.tool_call_id.as_deref().unwrap();
        let answers = state
            .messages
            .iter()
            .filter(|m| m.tool_call_id.as_deref() == Some(id))
            .count();
        assert_eq!(answers, 1, "call {id} answered more than once");
    }
}

#[tokio::test]
async fn test_sql_error_still_reaches_conclude() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(
        MockLlmClient::new()
            .with_text("only_db")
            .with_tool_call("schema_1", SCHEMA_TOOL, json!({"table_names": "meals"}))
            .with_tool_call("query_1", QUERY_TOOL, json!({"query": "SELEC food_name FORM meals"}))
            .with_tool_call(
                "final_1",
                SUBMIT_FINAL_ANSWER_TOOL,
                json!({"final_answer": {"message": "查询出错了，请换个说法再试试。"}}),
            ),
    );

    let state = workflow(&mock, &db)
        .run(ConversationState::new("这周我吃了哪些食物", "小明"))
        .await
        .unwrap();

    assert_eq!(state.sql_execution_log.len(), 1);
    assert!(state.sql_execution_log[0]
        .result
        .starts_with("message: SQL 执行失败，错误信息: "));
    assert_eq!(mock.requests().len(), 4);
    assert_eq!(
        meal_assistant::agent::final_outcome(&state).message,
        "查询出错了，请换个说法再试试。"
    );
}

#[tokio::test]
async fn test_unresolved_classification_hits_step_cap() {
    let (db, _dir) = create_test_db().await;
    let mut script = MockLlmClient::new();
    for _ in 0..20 {
        script = script.with_text("not sure yet");
    }
    let mock = Arc::new(script);

    let outcome = workflow(&mock, &db)
        .with_max_steps(10)
        .run_turn("随便聊聊", "小明")
        .await;

    assert_eq!(outcome.user_name, "");
    assert!(outcome.message.starts_with("处理响应时出错: "));
    assert!(outcome.message.contains("Step limit of 10"));
    assert!(mock.requests().len() <= 5);
}

#[tokio::test]
async fn test_short_classification_is_asked_again_once() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new().with_text("12345").with_text("only_db"));

    workflow(&mock, &db)
        .run(ConversationState::new("这周我吃了哪些食物", "小明"))
        .await
        .unwrap();

    let free_text: Vec<_> = mock
        .requests()
        .into_iter()
        .filter(|r| r.choice.is_none())
        .collect();
    assert_eq!(free_text.len(), 2);
    assert_eq!(free_text[0].messages, free_text[1].messages);
}

#[tokio::test]
async fn test_login_asking_for_tables_continues_down_database_path() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new().with_tool_call("login_1", LIST_TABLES_TOOL, json!({})));

    let state = workflow(&mock, &db)
        .run(ConversationState::new("今天吃了苹果", ""))
        .await
        .unwrap();

    assert_eq!(state.messages[1].tool_call_id.as_deref(), Some("login_1"));
    assert_eq!(
        state.table_list_result.as_deref(),
        Some("food_categories, meals, users")
    );
    let last = state.last_message().unwrap();
    assert_eq!(last.first_tool_call().unwrap().name, SUBMIT_FINAL_ANSWER_TOOL);
}

#[tokio::test]
async fn test_configured_workflow_writes_transcript() {
    let (db, dir) = create_test_db().await;
    let log_dir = dir.path().join("logs");
    let transcript = Arc::new(TranscriptLog::open(&log_dir).unwrap());
    let mock = Arc::new(MockLlmClient::new().with_text("db_rag").with_text("多喝水，多吃蔬菜。"));

    let db_client: Arc<dyn DatabaseClient> = db.clone();
    let workflow =
        Workflow::from_config(&Config::default(), mock.clone(), db_client, Some(transcript)).unwrap();
    let outcome = workflow.run_turn("有什么饮食建议", "小明").await;

    assert_eq!(outcome.message, "多喝水，多吃蔬菜。");
    let contents = std::fs::read_to_string(log_dir.join("transcript.log")).unwrap();
    assert!(contents.contains("db_rag"));
    assert!(contents.contains("多喝水，多吃蔬菜。"));
}
