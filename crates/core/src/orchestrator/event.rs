//! `TaskEvent` — the published event sum (§3, §4.F).
//!
//! The `type` tag follows snake_case (matching the SSE `event:` line), while
//! payload fields follow camelCase — the shape the external contract in §6
//! and §8 documents verbatim (`code_result{taskId?, …}`, `approval_request{toolPath, …}`).

use serde::Serialize;
use serde_json::Value;

use crate::approval::Decision;
use crate::sandbox::receipt::ToolCallReceipt;
use crate::tool_tree::ApprovalPreview;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TaskEvent {
    Status {
        message: String,
    },
    CodeGenerated {
        code: String,
    },
    CodeResult {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ApprovalRequest {
        id: String,
        tool_path: String,
        input: Value,
        preview: ApprovalPreview,
    },
    ApprovalResolved {
        id: String,
        decision: Decision,
    },
    ToolResult {
        receipt: ToolCallReceipt,
    },
    AgentMessage {
        text: String,
    },
    Error {
        error: String,
    },
    Completed {},
}

impl TaskEvent {
    /// The SSE `event:` line / reducer discriminant, matching the `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            TaskEvent::Status { .. } => "status",
            TaskEvent::CodeGenerated { .. } => "code_generated",
            TaskEvent::CodeResult { .. } => "code_result",
            TaskEvent::ApprovalRequest { .. } => "approval_request",
            TaskEvent::ApprovalResolved { .. } => "approval_resolved",
            TaskEvent::ToolResult { .. } => "tool_result",
            TaskEvent::AgentMessage { .. } => "agent_message",
            TaskEvent::Error { .. } => "error",
            TaskEvent::Completed {} => "completed",
        }
    }

    /// `completed` and `error` are terminal markers for the stream (§3).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Completed {} | TaskEvent::Error { .. })
    }
}
