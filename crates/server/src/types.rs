//! Request and response DTOs for the HTTP surface (§6).

use conduit_core::approval::Decision;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub prompt: String,
    pub requester_id: String,
    pub channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub requester_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: conduit_core::orchestrator::TaskStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveApprovalRequest {
    pub decision: Decision,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveApprovalResponse {
    pub call_id: String,
    pub decision: Decision,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddApprovalRuleRequest {
    pub tool_path: String,
    pub field: String,
    pub operator: conduit_core::approval::Operator,
    pub value: String,
    pub decision: Decision,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddApprovalRuleResponse {
    pub rule_id: String,
    /// Whether this rule immediately resolved an already-pending approval.
    pub resolved: bool,
}
