//! Immutable audit record of a single tool invocation (§3 `ToolCallReceipt`).

use serde::Serialize;
use serde_json::Value;

use crate::approval::Decision;
use crate::tool_tree::Approval;

const PREVIEW_MAX_CHARS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Succeeded,
    Failed,
    Denied,
}

/// Mirrors `ApprovalRule::Decision` plus the implicit "no approval needed"
/// case, so a receipt always has exactly one of `{auto, approved, denied}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptDecision {
    Auto,
    Approved,
    Denied,
}

impl From<Decision> for ReceiptDecision {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => ReceiptDecision::Approved,
            Decision::Denied => ReceiptDecision::Denied,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallReceipt {
    pub call_id: String,
    pub tool_path: String,
    pub approval: ApprovalMode,
    pub decision: ReceiptDecision,
    pub status: CallStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub input_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable mirror of [`Approval`] for receipts (the tree's enum lives
/// in `tool_tree` and is not itself `Serialize`, to keep that module
/// transport-agnostic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Auto,
    Required,
}

impl From<Approval> for ApprovalMode {
    fn from(a: Approval) -> Self {
        match a {
            Approval::Auto => ApprovalMode::Auto,
            Approval::Required => ApprovalMode::Required,
        }
    }
}

/// Bound a preview string to `PREVIEW_MAX_CHARS`, tolerating non-string and
/// non-serializable input (`null`/`undefined` included).
pub fn bounded_preview(value: &Value) -> String {
    let rendered = match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate_chars(&rendered, PREVIEW_MAX_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preview_tolerates_null() {
        assert_eq!(bounded_preview(&Value::Null), "null");
    }

    #[test]
    fn preview_truncates_long_strings() {
        let long = "a".repeat(500);
        let preview = bounded_preview(&json!(long));
        assert!(preview.chars().count() <= PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }
}
