//! Runs one conversation turn through the orchestration graph.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

use super::graph::{route, Next, Node};
use super::state::{ConversationState, RouteDecision, SqlExecution, StateUpdate, TurnOutcome};
use crate::config::Config;
use crate::db::DatabaseClient;
use crate::error::{AssistantError, Result};
use crate::llm::tools::{
    list_tables_tool, query_tool, schema_tool, submit_final_answer_tool, QueryToolInput,
    SubmitFinalAnswerInput, ToolBinding, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL,
    SUBMIT_FINAL_ANSWER_TOOL,
};
use crate::llm::types::{Message, ToolCall};
use crate::llm::{DeliveryMode, LlmClient, LlmInvoker, PromptSet};
use crate::logging::TranscriptLog;
use crate::tools::SqlToolkit;

/// Reply when the turn produced no messages at all.
pub const NO_MESSAGES_REPLY: &str = "没有获取到响应消息";
/// Reply when the last message carries no usable answer.
pub const NO_ANSWER_REPLY: &str = "没有获取到有效回答";

/// Id of the synthesized list-tables call that opens the database path.
pub const SEED_CALL_ID: &str = "tool_abcd123";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of the current time for SQL generation.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// The meal assistant's conversation workflow.
#[derive(Clone)]
pub struct Workflow {
    invoker: LlmInvoker,
    toolkit: SqlToolkit,
    prompts: PromptSet,
    max_steps: usize,
    clock: Clock,
}

impl Workflow {
    pub fn new(invoker: LlmInvoker, toolkit: SqlToolkit, prompts: PromptSet) -> Self {
        Self {
            invoker,
            toolkit,
            prompts,
            max_steps: 100,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Wires a workflow from configuration.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn LlmClient>,
        db: Arc<dyn DatabaseClient>,
        transcript: Option<Arc<TranscriptLog>>,
    ) -> Result<Self> {
        let mut invoker = LlmInvoker::new(client)
            .with_mode(DeliveryMode::from_streaming(config.llm.streaming))
            .with_min_answer_chars(config.agent.min_answer_chars);
        if let Some(transcript) = transcript {
            invoker = invoker.with_transcript(transcript);
        }

        let toolkit = SqlToolkit::new(db).with_schema_changes(config.agent.allow_schema_changes);
        let prompts = PromptSet::load(config.agent.prompts_dir.as_deref())?;

        Ok(Self::new(invoker, toolkit, prompts).with_max_steps(config.agent.max_steps))
    }

    /// Caps node transitions per turn.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs a turn and always produces a reply.
    ///
    /// Failures come back as a reply with an empty user name so the caller
    /// keeps the one it has.
    pub async fn run_turn(&self, request: &str, user_name: &str) -> TurnOutcome {
        match self.run(ConversationState::new(request, user_name)).await {
            Ok(state) => final_outcome(&state),
            Err(e) => {
                error!(error = %e, category = e.category(), "Turn failed");
                TurnOutcome::new("", format!("处理响应时出错: {e}"))
            }
        }
    }

    /// Drives `state` from the entry node until a terminal node.
    pub async fn run(&self, mut state: ConversationState) -> Result<ConversationState> {
        let mut node = Node::Entry;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.max_steps {
                return Err(AssistantError::orchestration(format!(
                    "Step limit of {} reached at {node}",
                    self.max_steps
                )));
            }

            debug!(node = %node, step = steps, "Running node");
            let update = self.step(node, &state).await?;
            state.apply(update);

            match route(node, &state) {
                Next::Node(next) => node = next,
                Next::End => {
                    info!(node = %node, steps, messages = state.messages.len(), "Turn finished");
                    return Ok(state);
                }
            }
        }
    }

    async fn step(&self, node: Node, state: &ConversationState) -> Result<StateUpdate> {
        match node {
            Node::Entry | Node::LoginRouting | Node::ClassifyRouting => Ok(StateUpdate::default()),
            Node::Login => self.login(state).await,
            Node::Classify => self.classify(state).await,
            Node::SeedListTables => Ok(seed_list_tables()),
            Node::ListTablesTool => {
                let messages = self.answer_pending_calls(state).await;
                Ok(StateUpdate {
                    table_list_result: latest_content(&messages, LIST_TABLES_TOOL),
                    messages,
                    ..StateUpdate::default()
                })
            }
            Node::SchemaRequest => self.schema_request(state).await,
            Node::SchemaTool => {
                let messages = self.answer_pending_calls(state).await;
                Ok(StateUpdate {
                    schema_result: latest_content(&messages, SCHEMA_TOOL),
                    messages,
                    ..StateUpdate::default()
                })
            }
            Node::GenerateSql => {
                let now = (self.clock)();
                let messages = sql_generation_prompt(&self.prompts, state, now)?;
                let binding = ToolBinding::forced(query_tool());
                let reply = self.invoker.invoke(&messages, Some(&binding)).await?;
                Ok(StateUpdate::message(reply))
            }
            Node::ExecuteSql => Ok(self.execute_sql(state).await),
            Node::Conclude => self.conclude(state).await,
            Node::Retrieval => {
                let messages = self
                    .prompts
                    .rag_retrieval
                    .render_messages(&[("require", state.request.as_str())])?;
                let reply = self.invoker.invoke(&messages, None).await?;
                Ok(StateUpdate::message(reply))
            }
        }
    }

    async fn login(&self, state: &ConversationState) -> Result<StateUpdate> {
        let messages = self
            .prompts
            .judge_username
            .render_messages(&[("require", state.request.as_str())])?;
        let binding = ToolBinding::required(vec![list_tables_tool(), submit_final_answer_tool()]);

        let reply = self.invoker.invoke(&messages, Some(&binding)).await?;
        info!(tool = ?reply.first_tool_call().map(|c| &c.name), "Login answered");
        Ok(StateUpdate::message(reply))
    }

    async fn classify(&self, state: &ConversationState) -> Result<StateUpdate> {
        let messages = self
            .prompts
            .judge_query
            .render_messages(&[("require", state.request.as_str())])?;

        let reply = self.invoker.invoke(&messages, None).await?;
        let decision = RouteDecision::parse(&reply.content);
        if decision == RouteDecision::Unclassified {
            warn!(answer = %reply.content, "Request not classified, asking again");
        } else {
            info!(decision = decision.as_str(), "Request classified");
        }

        Ok(StateUpdate::route(decision))
    }

    async fn schema_request(&self, state: &ConversationState) -> Result<StateUpdate> {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::user(state.request.clone()));
        messages.extend(state.messages.iter().cloned());

        let binding = ToolBinding::forced(schema_tool());
        let reply = self.invoker.invoke(&messages, Some(&binding)).await?;
        Ok(StateUpdate::message(reply))
    }

    async fn execute_sql(&self, state: &ConversationState) -> StateUpdate {
        let mut update = StateUpdate::default();

        for call in state.unanswered_tool_calls() {
            let response = self.toolkit.execute(call).await;
            if call.name == QUERY_TOOL {
                let sql = call
                    .parse_arguments::<QueryToolInput>()
                    .map(|input| input.query)
                    .unwrap_or_else(|_| call.arguments.clone());
                update
                    .sql_executions
                    .push(SqlExecution::new(&call.id, sql, &response.content));
            }
            update.messages.push(response);
        }

        update
    }

    async fn conclude(&self, state: &ConversationState) -> Result<StateUpdate> {
        let sql_and_result = serde_json::to_string(&state.sql_execution_log)
            .map_err(|e| AssistantError::internal(format!("Failed to encode SQL log: {e}")))?;
        let messages = self.prompts.conclude.render_messages(&[
            ("require", state.request.as_str()),
            ("sql_and_result", sql_and_result.as_str()),
        ])?;

        let binding = ToolBinding::forced(submit_final_answer_tool());
        let reply = self.invoker.invoke(&messages, Some(&binding)).await?;

        let user_name = submitted_answer(&reply)
            .and_then(|answer| answer.final_answer.user_name)
            .filter(|name| !name.is_empty() && *name != state.user_name);
        if let Some(name) = &user_name {
            info!(user_name = %name, "Final answer renamed the user");
        }

        Ok(StateUpdate {
            user_name,
            messages: vec![reply],
            ..StateUpdate::default()
        })
    }

    /// Executes every tool call still waiting for a response.
    async fn answer_pending_calls(&self, state: &ConversationState) -> Vec<Message> {
        let mut responses = Vec::new();
        for call in state.unanswered_tool_calls() {
            responses.push(self.toolkit.execute(call).await);
        }
        responses
    }
}

/// Builds the SQL-generation prompt. Same state and clock give the same prompt.
pub fn sql_generation_prompt(
    prompts: &PromptSet,
    state: &ConversationState,
    now: NaiveDateTime,
) -> Result<Vec<Message>> {
    let current_time = now.format(TIME_FORMAT).to_string();
    prompts.sql_generate.render_messages(&[
        ("require", state.request.as_str()),
        (
            "list_tables_tool_result",
            state.table_list_result.as_deref().unwrap_or_default(),
        ),
        (
            "get_schema_tool_result",
            state.schema_result.as_deref().unwrap_or_default(),
        ),
        ("user_name", state.user_name.as_str()),
        ("current_time", current_time.as_str()),
    ])
}

/// Extracts the reply and user name from a finished turn.
pub fn final_outcome(state: &ConversationState) -> TurnOutcome {
    let Some(last) = state.last_message() else {
        return TurnOutcome::new(&state.user_name, NO_MESSAGES_REPLY);
    };

    if last.has_tool_calls() {
        let Some(answer) = submitted_answer(last) else {
            return TurnOutcome::new(&state.user_name, NO_ANSWER_REPLY);
        };
        let user_name = answer
            .final_answer
            .user_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| state.user_name.clone());
        let message = answer
            .final_answer
            .message
            .unwrap_or_else(|| NO_ANSWER_REPLY.to_string());
        return TurnOutcome::new(user_name, message);
    }

    if last.content.is_empty() {
        TurnOutcome::new(&state.user_name, NO_ANSWER_REPLY)
    } else {
        TurnOutcome::new(&state.user_name, &last.content)
    }
}

fn seed_list_tables() -> StateUpdate {
    StateUpdate::message(Message::assistant_with_tool_calls(
        "",
        vec![ToolCall::new(SEED_CALL_ID, LIST_TABLES_TOOL, serde_json::json!({}))],
    ))
}

/// Arguments of the final-answer call in `message`, falling back to its first call.
fn submitted_answer(message: &Message) -> Option<SubmitFinalAnswerInput> {
    let call = message
        .tool_calls
        .iter()
        .find(|c| c.name == SUBMIT_FINAL_ANSWER_TOOL)
        .or_else(|| message.first_tool_call())?;

    match call.parse_arguments::<SubmitFinalAnswerInput>() {
        Ok(answer) => Some(answer),
        Err(e) => {
            warn!(error = %e, "Unreadable final answer");
            None
        }
    }
}

fn latest_content(messages: &[Message], tool_name: &str) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.name.as_deref() == Some(tool_name))
        .map(|m| m.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailingDatabaseClient, MealDb};
    use crate::llm::tools::ToolChoice;
    use crate::llm::MockLlmClient;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn workflow(mock: Arc<MockLlmClient>, db: Arc<dyn DatabaseClient>) -> Workflow {
        let invoker = LlmInvoker::new(mock).with_mode(DeliveryMode::Buffered);
        Workflow::new(invoker, SqlToolkit::new(db), PromptSet::builtin())
    }

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap()
    }

    #[test]
    fn test_final_outcome_fallbacks() {
        let state = ConversationState::new("q", "小明");
        assert_eq!(final_outcome(&state), TurnOutcome::new("小明", NO_MESSAGES_REPLY));

        let mut state = ConversationState::new("q", "小明");
        state.apply(StateUpdate::message(Message::assistant("")));
        assert_eq!(final_outcome(&state), TurnOutcome::new("小明", NO_ANSWER_REPLY));

        let mut state = ConversationState::new("q", "小明");
        state.apply(StateUpdate::message(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(
                "c",
                SUBMIT_FINAL_ANSWER_TOOL,
                serde_json::json!({"final_answer": {}}),
            )],
        )));
        assert_eq!(final_outcome(&state), TurnOutcome::new("小明", NO_ANSWER_REPLY));
    }

    #[test]
    fn test_final_outcome_reads_submitted_answer() {
        let mut state = ConversationState::new("q", "");
        state.apply(StateUpdate::message(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(
                "c",
                SUBMIT_FINAL_ANSWER_TOOL,
                serde_json::json!({"final_answer": {"user_name": "阿花", "message": "欢迎"}}),
            )],
        )));

        assert_eq!(final_outcome(&state), TurnOutcome::new("阿花", "欢迎"));
    }

    #[test]
    fn test_sql_generation_prompt_is_deterministic() {
        let prompts = PromptSet::builtin();
        let mut state = ConversationState::new("这周我吃了哪些食物", "小明");
        state.table_list_result = Some("food_categories, meals, users".into());
        state.schema_result = Some("CREATE TABLE meals (...)".into());

        let first = sql_generation_prompt(&prompts, &state, fixed_time()).unwrap();
        let second = sql_generation_prompt(&prompts, &state.clone(), fixed_time()).unwrap();

        assert_eq!(first, second);
        assert!(first[0].content.contains("2025-03-14 12:30:00"));
        assert!(first[0].content.contains("food_categories, meals, users"));
        assert!(first[0].content.contains("小明"));
    }

    #[tokio::test]
    async fn test_seed_call_opens_database_path() {
        let dir = tempdir().unwrap();
        let db = Arc::new(MealDb::open(&dir.path().join("meals.db")).await.unwrap());
        let mock = Arc::new(MockLlmClient::new().with_text("only_db"));

        let state = workflow(mock.clone(), db)
            .run(ConversationState::new("这周我吃了哪些食物", "小明"))
            .await
            .unwrap();

        let seed = &state.messages[0];
        assert_eq!(seed.first_tool_call().unwrap().id, SEED_CALL_ID);
        assert_eq!(state.messages[1].tool_call_id.as_deref(), Some(SEED_CALL_ID));
        assert_eq!(
            state.table_list_result.as_deref(),
            Some("food_categories, meals, users")
        );

        let choices: Vec<_> = mock.requests().into_iter().map(|r| r.choice).collect();
        assert_eq!(
            choices,
            vec![
                None,
                Some(ToolChoice::Tool(SCHEMA_TOOL.to_string())),
                Some(ToolChoice::Tool(QUERY_TOOL.to_string())),
                Some(ToolChoice::Tool(SUBMIT_FINAL_ANSWER_TOOL.to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_retrieval_branch_answers_with_text() {
        let mock = Arc::new(
            MockLlmClient::new()
                .with_text("db_rag")
                .with_text("多吃蔬菜，少吃油炸食品。"),
        );

        let outcome = workflow(mock, Arc::new(FailingDatabaseClient::default()))
            .run_turn("有什么健康饮食建议", "小明")
            .await;

        assert_eq!(outcome, TurnOutcome::new("小明", "多吃蔬菜，少吃油炸食品。"));
    }

    #[tokio::test]
    async fn test_provider_error_becomes_processing_reply() {
        let mock = Arc::new(MockLlmClient::new().with_error("rate limited"));

        let outcome = workflow(mock, Arc::new(FailingDatabaseClient::default()))
            .run_turn("今天吃了苹果", "小明")
            .await;

        assert_eq!(outcome.user_name, "");
        assert_eq!(outcome.message, "处理响应时出错: LLM error: rate limited");
    }

    #[tokio::test]
    async fn test_conclude_can_rename_user() {
        let dir = tempdir().unwrap();
        let db = Arc::new(MealDb::open(&dir.path().join("meals.db")).await.unwrap());
        let mock = Arc::new(
            MockLlmClient::new()
                .with_text("only_db")
                .with_tool_call("s", SCHEMA_TOOL, serde_json::json!({"table_names": "users"}))
                .with_tool_call(
                    "q",
                    QUERY_TOOL,
                    serde_json::json!({"query": "UPDATE users SET user_name = '大明' WHERE user_name = '小明'"}),
                )
                .with_tool_call(
                    "f",
                    SUBMIT_FINAL_ANSWER_TOOL,
                    serde_json::json!({"final_answer": {"user_name": "大明", "message": "已改名为大明"}}),
                ),
        );

        let outcome = workflow(mock, db).run_turn("把我的名字改成大明", "小明").await;

        assert_eq!(outcome, TurnOutcome::new("大明", "已改名为大明"));
    }
}
