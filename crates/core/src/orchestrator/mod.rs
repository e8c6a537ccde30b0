//! Task orchestrator (§4.F) — task registry, append-only event log, live
//! subscriber fan-out with replay-then-follow semantics, and the task
//! lifecycle state machine.

mod event;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

pub use event::TaskEvent;

use crate::approval::SharedApprovalEngine;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A snapshot of one pending approval, as embedded in the serialized Task
/// shape (§6): `pendingApprovals: [{callId, toolPath}]`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApprovalSummary {
    pub call_id: String,
    pub tool_path: String,
}

/// Serialized task snapshot (§6): `{id, prompt, requesterId, channelId?,
/// createdAt, status, resultText?, errorMessage?, eventCount, pendingApprovals}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub prompt: String,
    pub requester_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub event_count: usize,
    pub pending_approvals: Vec<PendingApprovalSummary>,
}

struct TaskData {
    status: TaskStatus,
    result_text: Option<String>,
    error_message: Option<String>,
    events: Vec<TaskEvent>,
    subscribers: Vec<mpsc::UnboundedSender<TaskEvent>>,
}

struct TaskEntry {
    id: String,
    prompt: String,
    requester_id: String,
    channel_id: Option<String>,
    created_at: DateTime<Utc>,
    cancelled: AtomicBool,
    data: Mutex<TaskData>,
}

/// Per-process task registry. Safe for concurrent readers/writers — each
/// task's mutable state lives behind its own lock (§5).
pub struct TaskOrchestrator {
    tasks: DashMap<String, Arc<TaskEntry>>,
    approvals: SharedApprovalEngine,
    seq: AtomicU64,
}

impl TaskOrchestrator {
    pub fn new(approvals: SharedApprovalEngine) -> Self {
        Self {
            tasks: DashMap::new(),
            approvals,
            seq: AtomicU64::new(0),
        }
    }

    pub fn create(
        &self,
        prompt: String,
        requester_id: String,
        channel_id: Option<String>,
    ) -> Result<Task, CoreError> {
        if prompt.trim().is_empty() {
            return Err(CoreError::EmptyPrompt);
        }
        if requester_id.trim().is_empty() {
            return Err(CoreError::EmptyRequesterId);
        }

        let created_at = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("task_{}_{}", created_at.timestamp_millis(), seq);

        let entry = Arc::new(TaskEntry {
            id: id.clone(),
            prompt,
            requester_id,
            channel_id,
            created_at,
            cancelled: AtomicBool::new(false),
            data: Mutex::new(TaskData {
                status: TaskStatus::Running,
                result_text: None,
                error_message: None,
                events: Vec::new(),
                subscribers: Vec::new(),
            }),
        });
        self.tasks.insert(id.clone(), entry.clone());
        Ok(self.snapshot(&entry))
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        let entry = self.tasks.get(id)?.clone();
        Some(self.snapshot(&entry))
    }

    pub fn list(&self, requester_id: Option<&str>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|e| requester_id.map_or(true, |r| e.requester_id == r))
            .map(|e| self.snapshot(e.value()))
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Whether `task_id`'s cancellation flag is set — consulted by the agent
    /// loop between rounds and by the runner's approval wait.
    pub fn is_cancelled(&self, task_id: &str) -> bool {
        self.tasks
            .get(task_id)
            .map(|e| e.cancelled.load(Ordering::Relaxed))
            .unwrap_or(true)
    }

    /// Append `event` to the log (while running) and synchronously notify
    /// subscribers; a subscriber whose channel is closed is evicted. Returns
    /// `false` if the task is unknown or already terminal — no new events
    /// are appended after a terminal status (§3, §4.F).
    pub fn emit(&self, task_id: &str, event: TaskEvent) -> bool {
        let Some(entry) = self.tasks.get(task_id).map(|e| e.clone()) else {
            return false;
        };

        let mut data = entry.data.lock();
        if data.status != TaskStatus::Running {
            return false;
        }

        data.events.push(event.clone());
        data.subscribers.retain(|sub| sub.send(event.clone()).is_ok());
        apply_side_effects(&mut data, &event);
        let went_terminal = data.status != TaskStatus::Running;
        drop(data);

        if went_terminal {
            self.approvals.cancel_task(task_id);
        }
        true
    }

    /// Register a new subscriber and return the event log snapshot taken
    /// atomically with registration, so the caller can replay it and then
    /// read from the returned receiver without missing or duplicating any
    /// event (§4.F, tested by scenario S7).
    pub fn subscribe(&self, task_id: &str) -> Option<(Vec<TaskEvent>, mpsc::UnboundedReceiver<TaskEvent>)> {
        let entry = self.tasks.get(task_id)?.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = {
            let mut data = entry.data.lock();
            data.subscribers.push(tx);
            data.events.clone()
        };
        Some((snapshot, rx))
    }

    /// Transition a running task to `cancelled`. Pending approvals owned by
    /// the task are cancelled; in-flight work observes `is_cancelled` at its
    /// next suspension point.
    pub fn cancel(&self, task_id: &str) -> Result<(), CoreError> {
        let entry = self
            .tasks
            .get(task_id)
            .map(|e| e.clone())
            .ok_or_else(|| CoreError::UnknownTask(task_id.to_string()))?;
        entry.cancelled.store(true, Ordering::Relaxed);

        let mut data = entry.data.lock();
        if data.status != TaskStatus::Running {
            return Err(CoreError::TaskNotRunning(task_id.to_string()));
        }
        data.status = TaskStatus::Cancelled;
        drop(data);

        self.approvals.cancel_task(task_id);
        Ok(())
    }

    fn snapshot(&self, entry: &TaskEntry) -> Task {
        let data = entry.data.lock();
        let pending_approvals = self
            .approvals
            .list_pending(Some(&entry.id))
            .into_iter()
            .map(|p| PendingApprovalSummary {
                call_id: p.call_id,
                tool_path: p.tool_path,
            })
            .collect();

        Task {
            id: entry.id.clone(),
            prompt: entry.prompt.clone(),
            requester_id: entry.requester_id.clone(),
            channel_id: entry.channel_id.clone(),
            created_at: entry.created_at,
            status: data.status,
            result_text: data.result_text.clone(),
            error_message: data.error_message.clone(),
            event_count: data.events.len(),
            pending_approvals,
        }
    }
}

fn apply_side_effects(data: &mut TaskData, event: &TaskEvent) {
    match event {
        TaskEvent::Completed {} => data.status = TaskStatus::Completed,
        TaskEvent::Error { error } => {
            data.status = TaskStatus::Failed;
            data.error_message = Some(error.clone());
        }
        TaskEvent::AgentMessage { text } => data.result_text = Some(text.clone()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalEngine;

    fn orchestrator() -> TaskOrchestrator {
        TaskOrchestrator::new(Arc::new(ApprovalEngine::new()))
    }

    #[test]
    fn create_rejects_empty_prompt_or_requester() {
        let orch = orchestrator();
        assert!(matches!(
            orch.create("".into(), "u".into(), None),
            Err(CoreError::EmptyPrompt)
        ));
        assert!(matches!(
            orch.create("hi".into(), "".into(), None),
            Err(CoreError::EmptyRequesterId)
        ));
    }

    #[test]
    fn emit_is_dropped_after_terminal() {
        let orch = orchestrator();
        let task = orch.create("hi".into(), "u".into(), None).unwrap();
        assert!(orch.emit(&task.id, TaskEvent::Completed {}));
        assert!(!orch.emit(&task.id, TaskEvent::Status { message: "late".into() }));
        let snapshot = orch.get(&task.id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.event_count, 1);
    }

    #[test]
    fn agent_message_sets_result_text_and_error_sets_failed() {
        let orch = orchestrator();
        let task = orch.create("hi".into(), "u".into(), None).unwrap();
        orch.emit(&task.id, TaskEvent::AgentMessage { text: "done".into() });
        assert_eq!(orch.get(&task.id).unwrap().result_text.as_deref(), Some("done"));

        let task2 = orch.create("hi".into(), "u".into(), None).unwrap();
        orch.emit(&task2.id, TaskEvent::Error { error: "boom".into() });
        let snap = orch.get(&task2.id).unwrap();
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn subscriber_replay_then_follow_misses_nothing_and_duplicates_nothing() {
        let orch = orchestrator();
        let task = orch.create("hi".into(), "u".into(), None).unwrap();

        orch.emit(&task.id, TaskEvent::Status { message: "1".into() });
        orch.emit(&task.id, TaskEvent::Status { message: "2".into() });
        orch.emit(&task.id, TaskEvent::Status { message: "3".into() });

        let (replay, mut rx) = orch.subscribe(&task.id).unwrap();
        assert_eq!(replay.len(), 3);

        orch.emit(&task.id, TaskEvent::Status { message: "4".into() });
        orch.emit(&task.id, TaskEvent::Status { message: "5".into() });
        orch.emit(&task.id, TaskEvent::Completed {});

        let mut followed = Vec::new();
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            followed.push(event);
            if terminal {
                break;
            }
        }
        assert_eq!(followed.len(), 3);
        assert_eq!(replay.len() + followed.len(), 6);
    }

    #[test]
    fn cancel_is_rejected_for_already_terminal_task() {
        let orch = orchestrator();
        let task = orch.create("hi".into(), "u".into(), None).unwrap();
        orch.emit(&task.id, TaskEvent::Completed {});
        assert!(matches!(orch.cancel(&task.id), Err(CoreError::TaskNotRunning(_))));
    }
}
