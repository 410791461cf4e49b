//! Prompt templates for the agent's model calls.
//!
//! Templates are plain text with `{name}` placeholders; `{{` and `}}` stand
//! for literal braces. Each workflow step renders one template into a single
//! user message.

use crate::error::{AssistantError, Result};
use crate::llm::types::Message;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

pub const JUDGE_USERNAME_FILE: &str = "judge_username.txt";
pub const JUDGE_QUERY_FILE: &str = "judge_query.txt";
pub const SQL_GENERATE_FILE: &str = "sql_generate.txt";
pub const CONCLUDE_FILE: &str = "conclude.txt";
pub const RAG_RETRIEVAL_FILE: &str = "rag_retrieval.txt";

const JUDGE_USERNAME_DEFAULT: &str = include_str!("../../prompts/judge_username.txt");
const JUDGE_QUERY_DEFAULT: &str = include_str!("../../prompts/judge_query.txt");
const SQL_GENERATE_DEFAULT: &str = include_str!("../../prompts/sql_generate.txt");
const CONCLUDE_DEFAULT: &str = include_str!("../../prompts/conclude.txt");
const RAG_RETRIEVAL_DEFAULT: &str = include_str!("../../prompts/rag_retrieval.txt");

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Reads a template from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::prompt(format!("Failed to read prompt {}: {e}", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, text))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitutes every placeholder. A placeholder without a value is an error.
    pub fn render(&self, params: &[(&str, &str)]) -> Result<String> {
        let mut missing = Vec::new();

        let rendered = placeholder_regex().replace_all(&self.text, |caps: &Captures| {
            match caps.get(1) {
                None if &caps[0] == "{{" => "{".to_string(),
                None => "}".to_string(),
                Some(name) => match params.iter().find(|(k, _)| *k == name.as_str()) {
                    Some((_, value)) => (*value).to_string(),
                    None => {
                        missing.push(name.as_str().to_string());
                        String::new()
                    }
                },
            }
        });

        if !missing.is_empty() {
            return Err(AssistantError::prompt(format!(
                "Prompt {} is missing parameter(s): {}",
                self.name,
                missing.join(", ")
            )));
        }

        Ok(rendered.into_owned())
    }

    /// Renders into the message list sent to the model.
    pub fn render_messages(&self, params: &[(&str, &str)]) -> Result<Vec<Message>> {
        Ok(vec![Message::user(self.render(params)?)])
    }
}

/// The templates used by the workflow.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub judge_username: PromptTemplate,
    pub judge_query: PromptTemplate,
    pub sql_generate: PromptTemplate,
    pub conclude: PromptTemplate,
    pub rag_retrieval: PromptTemplate,
}

impl PromptSet {
    /// The compiled-in templates.
    pub fn builtin() -> Self {
        Self {
            judge_username: PromptTemplate::new(JUDGE_USERNAME_FILE, JUDGE_USERNAME_DEFAULT),
            judge_query: PromptTemplate::new(JUDGE_QUERY_FILE, JUDGE_QUERY_DEFAULT),
            sql_generate: PromptTemplate::new(SQL_GENERATE_FILE, SQL_GENERATE_DEFAULT),
            conclude: PromptTemplate::new(CONCLUDE_FILE, CONCLUDE_DEFAULT),
            rag_retrieval: PromptTemplate::new(RAG_RETRIEVAL_FILE, RAG_RETRIEVAL_DEFAULT),
        }
    }

    /// Loads templates from `dir`, falling back to the built-in text for
    /// any file that is absent.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut set = Self::builtin();
        let Some(dir) = dir else {
            return Ok(set);
        };

        for template in [
            &mut set.judge_username,
            &mut set.judge_query,
            &mut set.sql_generate,
            &mut set.conclude,
            &mut set.rag_retrieval,
        ] {
            let path = dir.join(template.name());
            if path.is_file() {
                debug!(path = %path.display(), "Loading prompt template");
                *template = PromptTemplate::load(&path)?;
            }
        }

        Ok(set)
    }
}
