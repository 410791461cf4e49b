//! Conversation orchestration.
//!
//! A turn starts at the entry node with fresh [`ConversationState`] and walks
//! the graph in [`graph`] until a terminal node; [`Workflow`] runs the nodes.

pub mod graph;
pub mod state;
mod workflow;

pub use graph::{route, Next, Node};
pub use state::{ConversationState, RouteDecision, SqlExecution, StateUpdate, TurnOutcome};
pub use workflow::{
    final_outcome, sql_generation_prompt, Clock, Workflow, NO_ANSWER_REPLY, NO_MESSAGES_REPLY,
    SEED_CALL_ID,
};
