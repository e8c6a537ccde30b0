//! Agent loop (§4.E) — drives `Model ↔ Runner` to a terminal state, feeding
//! each code execution's result back into the conversation until the model
//! stops requesting code or the round budget is exhausted.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::approval::{Decision, SharedApprovalEngine};
use crate::orchestrator::{TaskEvent, TaskOrchestrator};
use crate::sandbox::{self, ApprovalRequest, ApprovalRequester, RunContext};
use crate::tool_tree::ToolTree;
use crate::typecheck;

use super::model::{ModelClient, ModelMessage};

pub const DEFAULT_MAX_ROUNDS: usize = 20;

/// Bridges the sandbox runner's approval seam to the task orchestrator: an
/// approval ask is published as `approval_request`, registered with the
/// approval engine, and (once resolved, by a rule or an external decider)
/// published as `approval_resolved`.
struct OrchestratorApprovalRequester {
    orchestrator: Arc<TaskOrchestrator>,
    approvals: SharedApprovalEngine,
}

#[async_trait]
impl ApprovalRequester for OrchestratorApprovalRequester {
    async fn request_approval(&self, request: ApprovalRequest) -> Decision {
        self.orchestrator.emit(
            &request.task_id,
            TaskEvent::ApprovalRequest {
                id: request.call_id.clone(),
                tool_path: request.tool_path.clone(),
                input: request.input.clone(),
                preview: request.preview.clone(),
            },
        );

        let rx = self.approvals.register(
            request.call_id.clone(),
            request.task_id.clone(),
            request.tool_path.clone(),
            request.input.clone(),
        );
        // A rule added before this call arrived may resolve it immediately.
        self.approvals.try_auto_resolve(&request.task_id, &request.call_id);

        // A closed channel (task cancelled, approvals swept) is treated as denied.
        let decision = rx.await.unwrap_or(Decision::Denied);

        self.orchestrator.emit(
            &request.task_id,
            TaskEvent::ApprovalResolved {
                id: request.call_id,
                decision,
            },
        );
        decision
    }
}

pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    tools: ToolTree,
    orchestrator: Arc<TaskOrchestrator>,
    approvals: SharedApprovalEngine,
    max_rounds: usize,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: ToolTree,
        orchestrator: Arc<TaskOrchestrator>,
        approvals: SharedApprovalEngine,
    ) -> Self {
        Self {
            model,
            tools,
            orchestrator,
            approvals,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Run the loop for `task_id` to completion. Never panics; every error
    /// path is absorbed into `error` + `completed` events (§4.E).
    pub async fn run(&self, task_id: String, prompt: String) {
        let catalog = typecheck::render_signatures(&self.tools);
        let mut messages = vec![ModelMessage::system(system_prompt(&catalog)), ModelMessage::user(prompt)];

        self.orchestrator.emit(&task_id, TaskEvent::Status { message: "Thinking...".into() });

        let mut rounds = 0usize;
        loop {
            if self.orchestrator.is_cancelled(&task_id) {
                return;
            }

            let response = match self.model.generate(&messages, &catalog).await {
                Ok(response) => response,
                Err(err) => {
                    self.orchestrator.emit(&task_id, TaskEvent::Error { error: err.to_string() });
                    self.orchestrator.emit(&task_id, TaskEvent::Completed {});
                    return;
                }
            };

            if response.tool_calls.is_empty() {
                self.orchestrator.emit(
                    &task_id,
                    TaskEvent::AgentMessage { text: response.text.unwrap_or_default() },
                );
                self.orchestrator.emit(&task_id, TaskEvent::Completed {});
                return;
            }

            for tool_call in response.tool_calls {
                if self.orchestrator.is_cancelled(&task_id) {
                    return;
                }

                if tool_call.name != "run_code" {
                    messages.push(ModelMessage::tool_result(
                        tool_call.id,
                        format!("Unknown tool \"{}\"; the only available tool is run_code.", tool_call.name),
                    ));
                    continue;
                }

                let code = tool_call
                    .arguments
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                self.orchestrator.emit(&task_id, TaskEvent::CodeGenerated { code: code.clone() });
                self.orchestrator.emit(&task_id, TaskEvent::Status { message: "Running code...".into() });

                let run_ctx = self.build_run_context(&task_id);
                let outcome = sandbox::run(code, run_ctx).await;

                for receipt in &outcome.receipts {
                    self.orchestrator.emit(&task_id, TaskEvent::ToolResult { receipt: receipt.clone() });
                }

                self.orchestrator.emit(
                    &task_id,
                    TaskEvent::CodeResult {
                        task_id: Some(task_id.clone()),
                        status: if outcome.ok { "completed".to_string() } else { "failed".to_string() },
                        exit_code: None,
                        stdout: outcome.value.as_ref().map(|v| v.to_string()),
                        stderr: None,
                        error: outcome.error.clone(),
                    },
                );

                let feedback = if outcome.ok {
                    serde_json::json!({"stdout": outcome.value, "error": Value::Null}).to_string()
                } else {
                    serde_json::json!({"error": outcome.error}).to_string()
                };
                messages.push(ModelMessage::tool_result(tool_call.id, feedback));

                rounds += 1;
                if rounds >= self.max_rounds {
                    self.orchestrator.emit(
                        &task_id,
                        TaskEvent::AgentMessage { text: "Reached maximum number of code executions.".into() },
                    );
                    self.orchestrator.emit(&task_id, TaskEvent::Completed {});
                    return;
                }
            }
        }
    }

    fn build_run_context(&self, task_id: &str) -> RunContext {
        let requester = Arc::new(OrchestratorApprovalRequester {
            orchestrator: self.orchestrator.clone(),
            approvals: self.approvals.clone(),
        });
        RunContext::new(self.tools.clone(), requester, task_id.to_string())
    }
}

fn system_prompt(catalog: &str) -> String {
    format!(
        "You are an assistant that accomplishes tasks by writing short programs.\n\
         The only way to cause an effect is to call the `run_code` tool with `{{code}}`: a string of code \
         that may call any of the tools below, each returning a Promise.\n\
         When you have a final answer, reply with text and no tool call.\n\n\
         Available tools:\n{catalog}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalEngine;
    use crate::demo_tools::demo_tools;
    use crate::agent::model::{ModelResponse, ScriptedModelClient};

    fn new_loop(responses: Vec<ModelResponse>) -> (Arc<TaskOrchestrator>, AgentLoop) {
        let approvals = Arc::new(ApprovalEngine::new());
        let orchestrator = Arc::new(TaskOrchestrator::new(approvals.clone()));
        let model = Arc::new(ScriptedModelClient::new(responses));
        let agent_loop = AgentLoop::new(model, demo_tools(), orchestrator.clone(), approvals);
        (orchestrator, agent_loop)
    }

    #[tokio::test]
    async fn trivial_completion_emits_agent_message_then_completed() {
        let (orchestrator, agent_loop) = new_loop(vec![ModelResponse::text("Hello.")]);
        let task = orchestrator.create("hi".into(), "u".into(), None).unwrap();
        let (replay, mut rx) = orchestrator.subscribe(&task.id).unwrap();
        assert!(replay.is_empty());

        agent_loop.run(task.id.clone(), "hi".into()).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.last(), Some(TaskEvent::Completed {})));
        assert!(events.iter().any(|e| matches!(e, TaskEvent::AgentMessage { text } if text == "Hello.")));
        assert_eq!(orchestrator.get(&task.id).unwrap().result_text.as_deref(), Some("Hello."));
    }

    #[tokio::test]
    async fn auto_approved_tool_call_produces_succeeded_receipt() {
        let (orchestrator, agent_loop) = new_loop(vec![
            ModelResponse::run_code("call-1", "return await tools.echo({message: 'hi'});"),
            ModelResponse::text("done"),
        ]);
        let task = orchestrator.create("hi".into(), "u".into(), None).unwrap();

        agent_loop.run(task.id.clone(), "hi".into()).await;

        let snapshot = orchestrator.get(&task.id).unwrap();
        assert_eq!(snapshot.result_text.as_deref(), Some("done"));
        assert_eq!(snapshot.status, crate::orchestrator::TaskStatus::Completed);
    }

    #[tokio::test]
    async fn model_error_emits_error_and_completed() {
        let (orchestrator, agent_loop) = new_loop(vec![]);
        let task = orchestrator.create("hi".into(), "u".into(), None).unwrap();
        agent_loop.run(task.id.clone(), "hi".into()).await;
        let snapshot = orchestrator.get(&task.id).unwrap();
        assert_eq!(snapshot.status, crate::orchestrator::TaskStatus::Failed);
    }

    #[tokio::test]
    async fn round_budget_terminates_loop() {
        let responses: Vec<ModelResponse> = (0..5)
            .map(|i| ModelResponse::run_code(format!("call-{i}"), "return 1;"))
            .collect();
        let (orchestrator, agent_loop) = new_loop(responses);
        let task = orchestrator.create("hi".into(), "u".into(), None).unwrap();
        let agent_loop = agent_loop.with_max_rounds(3);

        agent_loop.run(task.id.clone(), "hi".into()).await;

        let snapshot = orchestrator.get(&task.id).unwrap();
        assert_eq!(snapshot.status, crate::orchestrator::TaskStatus::Completed);
        assert_eq!(
            snapshot.result_text.as_deref(),
            Some("Reached maximum number of code executions.")
        );
    }
}
