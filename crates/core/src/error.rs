//! Error taxonomy for the orchestrator core.
//!
//! The sandbox runner and the task orchestrator are never-throw boundaries
//! (see ERROR HANDLING DESIGN): failures inside a running task become
//! `TaskEvent::Error` or a receipt, never a propagated `Result`. `CoreError`
//! is for the setup/plumbing paths that sit outside those boundaries (tool
//! registration, schema compilation, server-facing lookups).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid schema for tool {tool}: {source}")]
    SchemaError {
        tool: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("input for {tool} failed validation: {message}")]
    ValidationError { tool: String, message: String },

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("unknown approval call: {0}")]
    UnknownApproval(String),

    #[error("task {0} is not running")]
    TaskNotRunning(String),

    #[error("empty prompt")]
    EmptyPrompt,

    #[error("empty requester id")]
    EmptyRequesterId,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
