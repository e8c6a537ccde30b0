//! Approval engine (§4.D) — per-task queue of pending approvals, the
//! rendezvous between the sandbox runner (waiter) and an external resolver
//! (decider, e.g. an HTTP handler), and the rule table for auto-decisions.

mod rule;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

pub use rule::{ApprovalRule, Decision, Operator};

/// A tool call waiting on a human or rule-based decision.
pub struct PendingApproval {
    pub call_id: String,
    pub task_id: String,
    pub tool_path: String,
    pub input: Value,
    resolver: Mutex<Option<oneshot::Sender<Decision>>>,
}

/// Snapshot of a pending approval, safe to hand out to callers (no resolver).
#[derive(Debug, Clone)]
pub struct PendingApprovalInfo {
    pub call_id: String,
    pub task_id: String,
    pub tool_path: String,
    pub input: Value,
}

impl From<&PendingApproval> for PendingApprovalInfo {
    fn from(p: &PendingApproval) -> Self {
        Self {
            call_id: p.call_id.clone(),
            task_id: p.task_id.clone(),
            tool_path: p.tool_path.clone(),
            input: p.input.clone(),
        }
    }
}

/// Per-process registry of pending approvals and per-task rule tables.
///
/// `pending` and `rules` are independent `DashMap`s so that `resolve` and
/// `add_rule` never contend on an unrelated task's work — the spec's
/// low-contention justification for per-entry locking.
#[derive(Default)]
pub struct ApprovalEngine {
    pending: DashMap<String, PendingApproval>,
    rules: DashMap<String, Mutex<Vec<ApprovalRule>>>,
}

impl ApprovalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending approval and return the one-shot receiver the
    /// caller should await for the decision.
    pub fn register(
        &self,
        call_id: String,
        task_id: String,
        tool_path: String,
        input: Value,
    ) -> oneshot::Receiver<Decision> {
        let (tx, rx) = oneshot::channel();
        let pending = PendingApproval {
            call_id: call_id.clone(),
            task_id,
            tool_path,
            input,
            resolver: Mutex::new(Some(tx)),
        };
        self.pending.insert(call_id, pending);
        rx
    }

    /// Deliver a decision to the single waiter for `call_id` and remove the
    /// entry. Returns `false` if unknown or already resolved — at most one
    /// resolution per `call_id`.
    pub fn resolve(&self, call_id: &str, decision: Decision) -> bool {
        let Some((_, entry)) = self.pending.remove(call_id) else {
            return false;
        };
        let Some(tx) = entry.resolver.lock().take() else {
            return false;
        };
        tx.send(decision).is_ok()
    }

    pub fn list_pending(&self, task_id: Option<&str>) -> Vec<PendingApprovalInfo> {
        self.pending
            .iter()
            .filter(|entry| task_id.map_or(true, |t| entry.task_id == t))
            .map(|entry| PendingApprovalInfo::from(entry.value()))
            .collect()
    }

    /// Cancel (without a decision payload) all pending approvals for a task,
    /// e.g. when the task transitions to terminal. Waiters observe a closed
    /// channel and should treat that as denied.
    pub fn cancel_task(&self, task_id: &str) {
        let to_remove: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.task_id == task_id)
            .map(|e| e.call_id.clone())
            .collect();
        for call_id in to_remove {
            self.pending.remove(&call_id);
        }
    }

    /// Append a rule for `task_id`. Immediately evaluates it against every
    /// currently pending approval for that task; the first matching
    /// approval is resolved at once. Order of addition is priority: earlier
    /// rules are tried first on any subsequent re-evaluation, and each
    /// pending approval is resolved by whichever rule — already present or
    /// newly added — matches it first.
    pub fn add_rule(&self, task_id: &str, rule: ApprovalRule) {
        self.rules
            .entry(task_id.to_string())
            .or_default()
            .lock()
            .push(rule.clone());

        let candidates: Vec<PendingApprovalInfo> = self.list_pending(Some(task_id));
        for candidate in candidates {
            if matches(&rule, &candidate) {
                self.resolve(&candidate.call_id, rule.decision);
            }
        }
    }

    pub fn rules_for(&self, task_id: &str) -> Vec<ApprovalRule> {
        self.rules
            .get(task_id)
            .map(|r| r.lock().clone())
            .unwrap_or_default()
    }

    /// Evaluate every rule for `task_id` against a pending approval in
    /// priority order (first matching rule wins) and resolve it if one
    /// matches. Used right after a call is registered, so a rule added
    /// earlier in the task resolves it without waiting on an external
    /// decider.
    pub fn try_auto_resolve(&self, task_id: &str, call_id: &str) -> bool {
        let Some(entry) = self.pending.get(call_id) else {
            return false;
        };
        let info = PendingApprovalInfo::from(entry.value());
        drop(entry);

        for rule in self.rules_for(task_id) {
            if matches(&rule, &info) {
                return self.resolve(call_id, rule.decision);
            }
        }
        false
    }
}

/// Extract `rule.field` from `pending.input` by dot-path, coerce to string,
/// and compare per `rule.operator`. `includes`/`not_includes` are substring
/// tests. A field that cannot be coerced to a string (missing, object,
/// array, null) never matches — the spec's documented default.
pub fn matches(rule: &ApprovalRule, pending: &PendingApprovalInfo) -> bool {
    if rule.tool_path != pending.tool_path {
        return false;
    }
    let Some(actual) = extract_field(&pending.input, &rule.field) else {
        return false;
    };

    match rule.operator {
        Operator::Equals => actual == rule.value,
        Operator::NotEquals => actual != rule.value,
        Operator::Includes => actual.contains(&rule.value),
        Operator::NotIncludes => !actual.contains(&rule.value),
    }
}

fn extract_field(input: &Value, field: &str) -> Option<String> {
    let mut current = input;
    for segment in field.split('.') {
        current = current.get(segment)?;
    }
    coerce_to_string(current)
}

fn coerce_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Wrap an [`ApprovalEngine`] for shared ownership across the runner and the
/// server's HTTP handlers.
pub type SharedApprovalEngine = Arc<ApprovalEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_is_at_most_once() {
        let engine = ApprovalEngine::new();
        let rx = engine.register(
            "call-1".into(),
            "task-1".into(),
            "danger".into(),
            json!({}),
        );
        assert!(engine.resolve("call-1", Decision::Approved));
        assert!(!engine.resolve("call-1", Decision::Denied));
        assert_eq!(rx.await.unwrap(), Decision::Approved);
    }

    #[test]
    fn add_rule_resolves_matching_pending_immediately() {
        let engine = ApprovalEngine::new();
        let rx = engine.register(
            "call-1".into(),
            "task-1".into(),
            "danger".into(),
            json!({"target": "x"}),
        );
        engine.add_rule(
            "task-1",
            ApprovalRule {
                tool_path: "danger".into(),
                field: "target".into(),
                operator: Operator::Equals,
                value: "x".into(),
                decision: Decision::Approved,
            },
        );
        assert!(engine.list_pending(Some("task-1")).is_empty());
        drop(rx);
    }

    #[test]
    fn first_matching_rule_wins() {
        let engine = ApprovalEngine::new();
        let _rx = engine.register(
            "call-1".into(),
            "task-1".into(),
            "danger".into(),
            json!({"target": "x"}),
        );
        engine.add_rule(
            "task-1",
            ApprovalRule {
                tool_path: "danger".into(),
                field: "target".into(),
                operator: Operator::Equals,
                value: "x".into(),
                decision: Decision::Denied,
            },
        );
        // This second rule also matches, but the approval is already
        // resolved by the first — resolve() must be a no-op now.
        engine.add_rule(
            "task-1",
            ApprovalRule {
                tool_path: "danger".into(),
                field: "target".into(),
                operator: Operator::Equals,
                value: "x".into(),
                decision: Decision::Approved,
            },
        );
        assert!(!engine.resolve("call-1", Decision::Approved));
    }

    #[test]
    fn non_string_field_never_matches() {
        let pending = PendingApprovalInfo {
            call_id: "c".into(),
            task_id: "t".into(),
            tool_path: "danger".into(),
            input: json!({"target": {"nested": true}}),
        };
        let rule = ApprovalRule {
            tool_path: "danger".into(),
            field: "target".into(),
            operator: Operator::Equals,
            value: "[object Object]".into(),
            decision: Decision::Approved,
        };
        assert!(!matches(&rule, &pending));
    }

    #[test]
    fn rules_do_not_apply_retroactively_to_closed_approvals() {
        let engine = ApprovalEngine::new();
        let _rx = engine.register(
            "call-1".into(),
            "task-1".into(),
            "danger".into(),
            json!({"target": "x"}),
        );
        assert!(engine.resolve("call-1", Decision::Denied));
        // Rule added after the approval already closed must not resurrect it.
        engine.add_rule(
            "task-1",
            ApprovalRule {
                tool_path: "danger".into(),
                field: "target".into(),
                operator: Operator::Equals,
                value: "x".into(),
                decision: Decision::Approved,
            },
        );
        assert!(engine.list_pending(Some("task-1")).is_empty());
    }
}
