//! Core library for the agent task orchestrator: tool tree, sandbox runner,
//! approval engine, agent loop, task orchestrator, and event reducer.

pub mod agent;
pub mod approval;
pub mod demo_tools;
pub mod error;
pub mod orchestrator;
pub mod reducer;
pub mod sandbox;
pub mod tool_tree;
pub mod typecheck;

pub use error::CoreError;
