//! The orchestration graph.
//!
//! Nodes are named steps; [`route`] decides where the token goes next from
//! the node just run and the accumulated state. Routing never does I/O, so
//! the whole wiring is testable without a model or a database.

use std::fmt;

use super::state::{ConversationState, RouteDecision};
use crate::llm::tools::{LIST_TABLES_TOOL, SUBMIT_FINAL_ANSWER_TOOL};

/// A step of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Entry,
    Login,
    LoginRouting,
    Classify,
    ClassifyRouting,
    SeedListTables,
    ListTablesTool,
    SchemaRequest,
    SchemaTool,
    GenerateSql,
    ExecuteSql,
    Conclude,
    Retrieval,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Login => "login",
            Self::LoginRouting => "login-routing",
            Self::Classify => "classify",
            Self::ClassifyRouting => "classify-routing",
            Self::SeedListTables => "seed-list-tables-call",
            Self::ListTablesTool => "list-tables-tool",
            Self::SchemaRequest => "schema-request",
            Self::SchemaTool => "schema-tool",
            Self::GenerateSql => "generate-sql",
            Self::ExecuteSql => "execute-sql",
            Self::Conclude => "conclude",
            Self::Retrieval => "retrieval",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the token goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Node(Node),
    End,
}

/// Picks the step that follows `node`.
pub fn route(node: Node, state: &ConversationState) -> Next {
    match node {
        Node::Entry => {
            if state.user_name.is_empty() {
                Next::Node(Node::Login)
            } else {
                Next::Node(Node::Classify)
            }
        }
        Node::Login => Next::Node(Node::LoginRouting),
        Node::LoginRouting => match state.last_requested_tool() {
            Some(LIST_TABLES_TOOL) => Next::Node(Node::ListTablesTool),
            Some(SUBMIT_FINAL_ANSWER_TOOL) => Next::End,
            _ => Next::End,
        },
        Node::Classify => Next::Node(Node::ClassifyRouting),
        Node::ClassifyRouting => match state.route_decision {
            RouteDecision::DatabaseOnly => Next::Node(Node::SeedListTables),
            RouteDecision::DatabaseRetrieval => Next::Node(Node::Retrieval),
            RouteDecision::Unclassified => Next::Node(Node::Classify),
        },
        Node::SeedListTables => Next::Node(Node::ListTablesTool),
        Node::ListTablesTool => Next::Node(Node::SchemaRequest),
        Node::SchemaRequest => Next::Node(Node::SchemaTool),
        Node::SchemaTool => Next::Node(Node::GenerateSql),
        Node::GenerateSql => Next::Node(Node::ExecuteSql),
        Node::ExecuteSql => Next::Node(Node::Conclude),
        Node::Conclude | Node::Retrieval => Next::End,
    }
}
