//! A small built-in tool set used by the bundled HTTP server and by tests:
//! an auto-approved `echo`, a single-segment gated `danger`, and a nested
//! gated `github.issues.close` with a custom approval formatter — the exact
//! trio the spec's worked scenarios (S1-S7) exercise.

use std::sync::Arc;

use serde_json::json;

use crate::tool_tree::{Approval, ApprovalPreview, Tool, ToolTree};

pub fn demo_tools() -> ToolTree {
    ToolTree::build(|b| {
        b.define(
            "echo",
            Tool {
                description: "Echoes the given message back unchanged.".into(),
                approval: Approval::Auto,
                args_schema: json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }),
                returns_schema: json!({
                    "type": "object",
                    "properties": {"echoed": {"type": "string"}},
                    "required": ["echoed"]
                }),
                executor: Arc::new(|input: serde_json::Value| async move {
                    let message = input.get("message").cloned().unwrap_or(serde_json::Value::Null);
                    Ok(json!({"echoed": message}))
                }),
                format_approval: None,
            },
        );

        b.define(
            "danger",
            Tool {
                description: "A destructive action against a named target, gated on approval.".into(),
                approval: Approval::Required,
                args_schema: json!({
                    "type": "object",
                    "properties": {"target": {"type": "string"}},
                    "required": ["target"]
                }),
                returns_schema: json!({
                    "type": "object",
                    "properties": {"ok": {"type": "boolean"}},
                    "required": ["ok"]
                }),
                executor: Arc::new(|_input: serde_json::Value| async move { Ok(json!({"ok": true})) }),
                format_approval: None,
            },
        );

        b.define(
            "github.issues.close",
            Tool {
                description: "Closes a GitHub issue by number.".into(),
                approval: Approval::Required,
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "number"},
                        "reason": {"type": "string"}
                    },
                    "required": ["id"]
                }),
                returns_schema: json!({
                    "type": "object",
                    "properties": {"closed": {"type": "boolean"}},
                    "required": ["closed"]
                }),
                executor: Arc::new(|_input: serde_json::Value| async move { Ok(json!({"closed": true})) }),
                format_approval: Some(Arc::new(|input: &serde_json::Value| {
                    let id = input
                        .get("id")
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    ApprovalPreview {
                        title: format!("close issue {id}"),
                        details: input
                            .get("reason")
                            .and_then(serde_json::Value::as_str)
                            .map(|s| s.to_string()),
                        link: None,
                    }
                })),
            },
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_tools_has_the_three_spec_fixtures() {
        let tree = demo_tools();
        assert!(tree.get("echo").is_some());
        assert!(tree.get("danger").is_some());
        assert!(tree.get("github.issues.close").is_some());
        assert_eq!(tree.get("echo").unwrap().approval, Approval::Auto);
        assert_eq!(tree.get("danger").unwrap().approval, Approval::Required);
    }
}
