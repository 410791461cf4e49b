//! Command-line argument parsing for the meal assistant.
//!
//! Flags override the matching configuration file values.

use crate::config::Config;
use crate::error::Result;
use crate::session::ReplyStyle;
use clap::Parser;
use std::path::PathBuf;

/// A conversational meal-tracking assistant.
#[derive(Parser, Debug)]
#[command(name = "meal-assistant")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// LLM provider (openai, dashscope, mock)
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Model name
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// User name to chat as
    #[arg(short = 'u', long, value_name = "NAME")]
    pub user: Option<String>,

    /// Reply style: 轻松, 幽默 or 正式
    #[arg(short = 's', long, value_name = "STYLE")]
    pub style: Option<String>,

    /// Directory with prompt templates
    #[arg(long, value_name = "DIR")]
    pub prompts: Option<PathBuf>,

    /// Send one message, print the reply and exit
    #[arg(short = 'm', long, value_name = "TEXT")]
    pub message: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(db) = &self.db {
            config.database.path = Some(db.clone());
        }
        if let Some(provider) = &self.llm {
            config.llm.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(style) = &self.style {
            config.chat.style = style.parse::<ReplyStyle>()?.as_str().to_string();
        }
        if let Some(prompts) = &self.prompts {
            config.agent.prompts_dir = Some(prompts.clone());
        }
        Ok(())
    }
}
