//! Chat session: identity, reply styling and visible history.
//!
//! Sits between the chat loop and the [`Workflow`]. It makes sure the user
//! is registered before the first turn, greets newly registered users and
//! decorates replies in the chosen style.

use std::fmt;
use std::str::FromStr;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::agent::{TurnOutcome, Workflow};
use crate::db::meals::{self, FoodCategory, Meal, MealFilter};
use crate::db::users;
use crate::error::{AssistantError, Result};
use crate::llm::types::{Conversation, Message};

/// Reply when no user name has been given.
pub const MISSING_USER_REPLY: &str = "⚠️ 请先填写用户名再开始对话哦~";
/// Reply when the user name could not be registered.
pub const REGISTRATION_FAILED_REPLY: &str = "⚠️ 创建用户失败，请尝试使用其他用户名。";
/// Reply when a turn blows up outside the workflow.
pub const APOLOGY_REPLY: &str = "很抱歉！宕机了！";

/// Tone used for replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyStyle {
    #[default]
    Relaxed,
    Humorous,
    Formal,
}

impl ReplyStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relaxed => "轻松",
            Self::Humorous => "幽默",
            Self::Formal => "正式",
        }
    }

    /// Prefix put in front of every reply.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Relaxed => "嘿嘿~ ",
            Self::Humorous => "哎嘛~ ",
            Self::Formal => "尊敬的用户，",
        }
    }

    /// Greeting for a freshly registered user.
    pub fn welcome(&self, user_name: &str) -> String {
        let base = format!(
            "欢迎您，{user_name}！您的账号已自动创建成功。\
             我是您的私人健康食谱助手，可以帮您记录每天的饮食，并提供健康饮食建议。"
        );
        let closing = match self {
            Self::Relaxed => "开始记录您的健康饮食之旅吧！",
            Self::Humorous => "吃得好才能活得好，让我来帮你打理好每一餐吧！",
            Self::Formal => "为您提供专业的健康饮食建议是我的荣幸。",
        };
        format!("{}{base}{closing}", self.prefix())
    }

    pub fn decorate(&self, reply: &str) -> String {
        format!("{}{reply}", self.prefix())
    }
}

impl fmt::Display for ReplyStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyStyle {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "轻松" | "relaxed" => Ok(Self::Relaxed),
            "幽默" | "humorous" => Ok(Self::Humorous),
            "正式" | "formal" => Ok(Self::Formal),
            other => Err(AssistantError::config(format!(
                "Unknown reply style '{other}'. Use 轻松, 幽默 or 正式."
            ))),
        }
    }
}

/// Runs a turn for a caller with no user name and stores the name the login
/// step picked, so the next turn under that name finds an existing user.
pub async fn login_turn(
    workflow: &Workflow,
    pool: &SqlitePool,
    message: &str,
) -> Result<TurnOutcome> {
    let outcome = workflow.run_turn(message, "").await;
    if !outcome.user_name.is_empty() {
        match users::register_user(pool, &outcome.user_name).await? {
            Some(user_id) => {
                info!(user_name = %outcome.user_name, user_id, "Registered user from login")
            }
            None => warn!(user_name = %outcome.user_name, "Login picked an existing user name"),
        }
    }
    Ok(outcome)
}

/// One user's chat with the assistant.
pub struct ChatSession {
    workflow: Workflow,
    pool: SqlitePool,
    style: ReplyStyle,
    user_name: String,
    history: Conversation,
}

impl ChatSession {
    pub fn new(workflow: Workflow, pool: SqlitePool, history_limit: usize) -> Self {
        Self {
            workflow,
            pool,
            style: ReplyStyle::default(),
            user_name: String::new(),
            history: Conversation::with_max_exchanges(history_limit),
        }
    }

    pub fn with_style(mut self, style: ReplyStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_user(mut self, user_name: impl Into<String>) -> Self {
        self.set_user_name(user_name);
        self
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn set_user_name(&mut self, user_name: impl Into<String>) {
        self.user_name = user_name.into().trim().to_string();
    }

    pub fn style(&self) -> ReplyStyle {
        self.style
    }

    pub fn set_style(&mut self, style: ReplyStyle) {
        self.style = style;
    }

    /// Visible history, oldest first.
    pub fn history(&self) -> &[Message] {
        self.history.messages()
    }

    /// Handles one user message and returns the replies to show, in order.
    pub async fn send(&mut self, message: &str) -> Vec<String> {
        if self.user_name.is_empty() {
            return vec![MISSING_USER_REPLY.to_string()];
        }

        let is_new_user = match self.ensure_registered().await {
            Ok(Some(is_new)) => is_new,
            Ok(None) => return vec![REGISTRATION_FAILED_REPLY.to_string()],
            Err(e) => {
                error!(error = %e, "User lookup failed");
                return vec![APOLOGY_REPLY.to_string()];
            }
        };

        let mut replies = Vec::new();
        if is_new_user && self.history.is_empty() {
            let welcome = self.style.welcome(&self.user_name);
            self.record("", &welcome);
            replies.push(welcome);
            if message.trim().is_empty() {
                return replies;
            }
        }

        let outcome = self.workflow.run_turn(message, &self.user_name).await;
        if !outcome.user_name.is_empty() && outcome.user_name != self.user_name {
            info!(from = %self.user_name, to = %outcome.user_name, "Adopting new user name");
            self.user_name = outcome.user_name;
        }

        let reply = self.style.decorate(&outcome.message);
        self.record(message, &reply);
        replies.push(reply);
        replies
    }

    /// The current user's logged meals, newest first. Empty for unknown users.
    pub async fn meals(&self, filter: &MealFilter) -> Result<Vec<Meal>> {
        match users::find_user_id(&self.pool, &self.user_name).await? {
            Some(user_id) => meals::list_user_meals(&self.pool, user_id, filter).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn food_categories(&self) -> Result<Vec<FoodCategory>> {
        meals::list_food_categories(&self.pool).await
    }

    /// Registers the current user if unknown.
    ///
    /// `Some(true)` means the user was just created, `None` that
    /// registration failed.
    async fn ensure_registered(&self) -> Result<Option<bool>> {
        if users::get_user_by_name(&self.pool, &self.user_name)
            .await?
            .is_some()
        {
            return Ok(Some(false));
        }

        match users::register_user(&self.pool, &self.user_name).await {
            Ok(Some(user_id)) => {
                info!(user_name = %self.user_name, user_id, "Registered new user");
                Ok(Some(true))
            }
            Ok(None) => {
                warn!(user_name = %self.user_name, "User name already taken");
                Ok(None)
            }
            Err(e) => {
                warn!(user_name = %self.user_name, error = %e, "Failed to register user");
                Ok(None)
            }
        }
    }

    fn record(&mut self, user: &str, assistant: &str) {
        self.history.add_user(user);
        self.history.add_assistant(assistant);
    }
}
