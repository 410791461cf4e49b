//! Integration tests for the chat session and chat loop.

use std::sync::Arc;

use meal_assistant::agent::Workflow;
use meal_assistant::db::meals::{self, MealFilter, MealType, NewMeal};
use meal_assistant::db::{users, MealDb};
use meal_assistant::llm::tools::{QUERY_TOOL, SCHEMA_TOOL, SUBMIT_FINAL_ANSWER_TOOL};
use meal_assistant::llm::{LlmInvoker, MockLlmClient, PromptSet};
use meal_assistant::repl;
use meal_assistant::session::{
    login_turn, ChatSession, ReplyStyle, APOLOGY_REPLY, MISSING_USER_REPLY,
};
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

fn session(mock: &Arc<MockLlmClient>, db: &Arc<MealDb>, history_limit: usize) -> ChatSession {
    ChatSession::new(workflow(mock, db), db.pool().clone(), history_limit)
}

/// Script for one turn answered by the retrieval branch.
fn advice(mock: MockLlmClient, reply: &str) -> MockLlmClient {
    mock.with_text("db_rag").with_text(reply)
}

#[tokio::test]
async fn test_missing_user_name_is_refused() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new());
    let mut session = session(&mock, &db, 20).with_user("   ");

    let replies = session.send("今天吃了苹果").await;

    assert_eq!(replies, vec![MISSING_USER_REPLY.to_string()]);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_login_turn_registers_generated_name() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(
        MockLlmClient::new()
            .with_tool_call(
                "login_1",
                SUBMIT_FINAL_ANSWER_TOOL,
                json!({"final_answer": {"user_name": "苹果爱好者", "message": "已为您创建用户名：苹果爱好者"}}),
            )
            .with_text("db_rag")
            .with_text("苹果是很好的加餐。"),
    );
    let workflow = workflow(&mock, &db);

    let outcome = login_turn(&workflow, db.pool(), "今天吃了苹果")
        .await
        .unwrap();

    assert_eq!(outcome.user_name, "苹果爱好者");
    assert!(users::find_user_id(db.pool(), "苹果爱好者").await.unwrap().is_some());

    let mut next = ChatSession::new(workflow, db.pool().clone(), 20).with_user("苹果爱好者");
    let replies = next.send("苹果健康吗").await;
    assert_eq!(replies, vec!["嘿嘿~ 苹果是很好的加餐。".to_string()]);
}

#[tokio::test]
async fn test_login_turn_without_name_registers_nothing() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new().with_error("upstream unavailable"));
    let workflow = workflow(&mock, &db);

    let outcome = login_turn(&workflow, db.pool(), "今天吃了苹果")
        .await
        .unwrap();

    assert_eq!(outcome.user_name, "");
    assert!(users::get_user_by_name(db.pool(), "").await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_user_is_registered_and_welcomed() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(advice(MockLlmClient::new(), "早餐可以加一个鸡蛋。"));
    let mut session = session(&mock, &db, 20)
        .with_style(ReplyStyle::Humorous)
        .with_user("小红");

    let replies = session.send("早餐吃什么好").await;

    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], ReplyStyle::Humorous.welcome("小红"));
    assert_eq!(replies[1], "哎嘛~ 早餐可以加一个鸡蛋。");
    assert!(users::find_user_id(db.pool(), "小红").await.unwrap().is_some());
    assert_eq!(session.history().len(), 4);
}

#[tokio::test]
async fn test_welcome_only_for_empty_first_message() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new());
    let mut session = session(&mock, &db, 20).with_user("小红");

    let replies = session.send("").await;

    assert_eq!(replies, vec![ReplyStyle::Relaxed.welcome("小红")]);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_existing_user_is_not_welcomed() {
    let (db, _dir) = create_test_db().await;
    users::register_user(db.pool(), "小明").await.unwrap();
    let mock = Arc::new(advice(MockLlmClient::new(), "多吃一些新鲜水果。"));
    let mut session = session(&mock, &db, 20)
        .with_style(ReplyStyle::Formal)
        .with_user("小明");

    let replies = session.send("有什么建议").await;

    assert_eq!(replies, vec!["尊敬的用户，多吃一些新鲜水果。".to_string()]);
}

#[tokio::test]
async fn test_database_failure_yields_apology() {
    let (db, _dir) = create_test_db().await;
    let mock = Arc::new(MockLlmClient::new());
    let mut session = session(&mock, &db, 20).with_user("小明");
    db.pool().close().await;

    let replies = session.send("今天吃了苹果").await;

    assert_eq!(replies, vec![APOLOGY_REPLY.to_string()]);
}

#[tokio::test]
async fn test_session_adopts_renamed_user() {
    let (db, _dir) = create_test_db().await;
    users::register_user(db.pool(), "小明").await.unwrap();
    let mock = Arc::new(
        MockLlmClient::new()
            .with_text("only_db")
            .with_tool_call("s", SCHEMA_TOOL, json!({"table_names": "users"}))
            .with_tool_call(
                "q",
                QUERY_TOOL,
                json!({"query": "UPDATE users SET user_name = '大明' WHERE user_name = '小明'"}),
            )
            .with_tool_call(
                "f",
                SUBMIT_FINAL_ANSWER_TOOL,
                json!({"final_answer": {"user_name": "大明", "message": "好的，以后叫您大明。"}}),
            ),
    );
    let mut session = session(&mock, &db, 20).with_user("小明");

    session.send("以后叫我大明").await;

    assert_eq!(session.user_name(), "大明");
}

#[tokio::test]
async fn test_failed_turn_keeps_user_name() {
    let (db, _dir) = create_test_db().await;
    users::register_user(db.pool(), "小明").await.unwrap();
    let mock = Arc::new(MockLlmClient::new().with_error("upstream unavailable"));
    let mut session = session(&mock, &db, 20).with_user("小明");

    let replies = session.send("这周我吃了哪些食物").await;

    assert_eq!(session.user_name(), "小明");
    assert_eq!(
        replies,
        vec!["嘿嘿~ 处理响应时出错: LLM error: upstream unavailable".to_string()]
    );
}

#[tokio::test]
async fn test_history_is_trimmed_to_limit() {
    let (db, _dir) = create_test_db().await;
    users::register_user(db.pool(), "小明").await.unwrap();
    let mut script = MockLlmClient::new();
    for reply in ["第一条回复内容", "第二条回复内容", "第三条回复内容"] {
        script = advice(script, reply);
    }
    let mock = Arc::new(script);
    let mut session = session(&mock, &db, 2).with_user("小明");

    for message in ["一", "二", "三"] {
        session.send(message).await;
    }

    let contents: Vec<&str> = session.history().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["二", "嘿嘿~ 第二条回复内容", "三", "嘿嘿~ 第三条回复内容"]);
}

#[tokio::test]
async fn test_chat_loop_handles_commands_and_messages() {
    let (db, _dir) = create_test_db().await;
    let user_id = users::register_user(db.pool(), "小明").await.unwrap().unwrap();
    meals::add_meal(
        db.pool(),
        &NewMeal::new(user_id, MealType::Breakfast, "燕麦粥").on_date("2025-03-10"),
    )
    .await
    .unwrap();
    let mock = Arc::new(advice(MockLlmClient::new(), "燕麦粥是很好的早餐。"));
    let mut session = session(&mock, &db, 20);

    let input: &[u8] = "/user 小明\n/style 正式\n燕麦粥健康吗\n/meals\n/nope\n/quit\n这行不会被读取\n"
        .as_bytes();
    let mut output = Vec::new();
    repl::run(&mut session, input, &mut output).await.unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("当前用户: 小明"));
    assert!(text.contains("回复风格: 正式"));
    assert!(text.contains("尊敬的用户，燕麦粥是很好的早餐。"));
    assert!(text.contains("2025-03-10 breakfast 燕麦粥"));
    assert!(text.contains("未知命令: /nope"));
    assert_eq!(session.history().len(), 2);

    let logged = session.meals(&MealFilter::default()).await.unwrap();
    assert_eq!(logged.len(), 1);
}
