//! Event reducer (§4.G, published contract) — a pure, total fold of the
//! `TaskEvent` stream into state a chat front-end can render directly.

use serde::Serialize;

use crate::approval::Decision;
use crate::orchestrator::TaskEvent;
use crate::sandbox::receipt::CallStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Running,
    Completed,
    Failed,
}

impl Default for ClientStatus {
    fn default() -> Self {
        ClientStatus::Running
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApprovalView {
    pub id: String,
    pub tool_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub status: ClientStatus,
    pub status_message: Option<String>,
    pub code_blocks: Vec<String>,
    pub tool_results: Vec<String>,
    pub pending_approvals: Vec<PendingApprovalView>,
    pub agent_message: Option<String>,
    pub error: Option<String>,
}

/// `reduce(state, event) -> state`. Takes `state` by value and returns the
/// next state; never panics, regardless of event ordering.
pub fn reduce(mut state: ClientState, event: &TaskEvent) -> ClientState {
    match event {
        TaskEvent::Status { message } => {
            state.status_message = Some(message.clone());
        }
        TaskEvent::CodeGenerated { code } => {
            state.code_blocks.push(code.clone());
            state.status_message = Some("Running code...".to_string());
        }
        TaskEvent::CodeResult { .. } => {
            // No reducer rule is specified for code_result beyond what
            // code_generated/tool_result/agent_message already cover.
        }
        TaskEvent::ApprovalRequest { id, tool_path, .. } => {
            state.pending_approvals.push(PendingApprovalView {
                id: id.clone(),
                tool_path: tool_path.clone(),
            });
            state.status_message = Some("Waiting for approval...".to_string());
        }
        TaskEvent::ApprovalResolved { id, decision } => {
            state.pending_approvals.retain(|p| &p.id != id);
            state.status_message = Some(match decision {
                Decision::Approved => "Approved, continuing...".to_string(),
                Decision::Denied => "Denied, continuing...".to_string(),
            });
        }
        TaskEvent::ToolResult { receipt } => {
            let icon = match receipt.status {
                CallStatus::Succeeded => "✅",
                CallStatus::Denied => "⛔",
                CallStatus::Failed => "❌",
            };
            state.tool_results.push(format!("{icon} {}", receipt.tool_path));
        }
        TaskEvent::AgentMessage { text } => {
            state.agent_message = Some(text.clone());
            state.status_message = Some("Done".to_string());
        }
        TaskEvent::Error { error } => {
            state.status = ClientStatus::Failed;
            state.error = Some(error.clone());
            state.status_message = Some("Failed".to_string());
        }
        TaskEvent::Completed {} => {
            state.status = ClientStatus::Completed;
            state.status_message = Some("Completed".to_string());
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_updates_status_message() {
        let state = reduce(ClientState::default(), &TaskEvent::Status { message: "Thinking...".into() });
        assert_eq!(state.status_message.as_deref(), Some("Thinking..."));
    }

    #[test]
    fn approval_request_then_resolved_round_trips_pending_list() {
        let state = reduce(
            ClientState::default(),
            &TaskEvent::ApprovalRequest {
                id: "call-1".into(),
                tool_path: "danger".into(),
                input: json!({}),
                preview: crate::tool_tree::ApprovalPreview {
                    title: "execute danger".into(),
                    details: None,
                    link: None,
                },
            },
        );
        assert_eq!(state.pending_approvals.len(), 1);

        let state = reduce(
            state,
            &TaskEvent::ApprovalResolved { id: "call-1".into(), decision: Decision::Approved },
        );
        assert!(state.pending_approvals.is_empty());
        assert_eq!(state.status_message.as_deref(), Some("Approved, continuing..."));
    }

    #[test]
    fn terminal_events_set_status() {
        let state = reduce(ClientState::default(), &TaskEvent::Error { error: "boom".into() });
        assert_eq!(state.status, ClientStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("boom"));

        let state = reduce(ClientState::default(), &TaskEvent::Completed {});
        assert_eq!(state.status, ClientStatus::Completed);
    }
}
