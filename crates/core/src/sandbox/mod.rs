//! Sandbox runner (§4.C) — evaluates a code string against a materialized
//! `tools` object, recording every call as a [`receipt::ToolCallReceipt`]
//! and mediating approvals through an injected [`ApprovalRequester`].

mod engine;
pub mod receipt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::approval::Decision;
use crate::tool_tree::ApprovalPreview;
use crate::tool_tree::ToolTree;
use receipt::{CallStatus, ToolCallReceipt};

/// Shared accumulator for receipts recorded during one `run`. Kept outside
/// the evaluation future so receipts recorded before a timeout are not lost
/// when the future is dropped.
#[derive(Clone, Default)]
pub(crate) struct ReceiptSink(Arc<Mutex<Vec<ToolCallReceipt>>>);

impl ReceiptSink {
    pub(crate) fn push(&self, receipt: ToolCallReceipt) {
        self.0.lock().push(receipt);
    }

    fn drain(&self) -> Vec<ToolCallReceipt> {
        std::mem::take(&mut self.0.lock())
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One approval ask raised mid-evaluation. Carries everything a decider
/// needs to render a prompt without reaching back into the sandbox.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub call_id: String,
    pub task_id: String,
    pub tool_path: String,
    pub input: Value,
    pub preview: ApprovalPreview,
}

/// The seam between the runner (waiter) and whatever drives real decisions
/// (the orchestrator publishing `approval_request` and awaiting the
/// approval engine's rendezvous). Kept separate from [`crate::approval::ApprovalEngine`]
/// so the runner never depends on how (or whether) an event is published.
#[async_trait]
pub trait ApprovalRequester: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> Decision;
}

/// `ctx` of §4.C: the tool tree, the approval seam, timeout, and the
/// injectable `now`/`newCallId` the spec requires for deterministic tests.
pub struct RunContext {
    pub tools: ToolTree,
    pub requester: Arc<dyn ApprovalRequester>,
    pub task_id: String,
    pub timeout: Duration,
    pub now: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    pub new_call_id: Arc<dyn Fn() -> String + Send + Sync>,
}

impl RunContext {
    pub fn new(tools: ToolTree, requester: Arc<dyn ApprovalRequester>, task_id: impl Into<String>) -> Self {
        Self {
            tools,
            requester,
            task_id: task_id.into(),
            timeout: DEFAULT_TIMEOUT,
            now: Arc::new(Utc::now),
            new_call_id: Arc::new(|| Uuid::new_v4().to_string()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `{ok, value?, error?, receipts[]}` of §4.C.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ok: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub receipts: Vec<ToolCallReceipt>,
}

/// Evaluate `code` against `ctx`. Never panics or propagates an error to the
/// caller — all failure is folded into the returned [`RunOutcome`].
pub async fn run(code: String, ctx: RunContext) -> RunOutcome {
    let timeout = ctx.timeout;
    let sink = ReceiptSink::default();

    let outcome = tokio::time::timeout(timeout, engine::evaluate(code, ctx, sink.clone())).await;
    let receipts = sink.drain();
    let denied = receipts.iter().any(|r| r.status == CallStatus::Denied);

    match outcome {
        Ok(Ok(value)) => RunOutcome {
            ok: !denied,
            value: Some(value),
            error: None,
            receipts,
        },
        Ok(Err(message)) => RunOutcome {
            ok: false,
            value: None,
            error: Some(message),
            receipts,
        },
        Err(_elapsed) => RunOutcome {
            ok: false,
            value: None,
            error: Some("timeout".to_string()),
            receipts,
        },
    }
}
