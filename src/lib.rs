//! meal-assistant - A conversational meal-tracking assistant.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod agent;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod repl;
pub mod safety;
pub mod session;
pub mod tools;
