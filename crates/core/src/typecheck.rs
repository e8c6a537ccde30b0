//! Typechecker / signature renderer (§4.B).
//!
//! Produces a deterministic tool catalog for prompting and client display,
//! and a `declare const tools: { … }` style block for optional static
//! checking by a scripting host. Neither function ever panics: unknown
//! schema shapes render as `unknown`.

use serde_json::Value;

use crate::tool_tree::ToolTree;

/// One line of the rendered catalog, also handed to the sandbox runner to
/// build the model-facing tool list.
#[derive(Debug, Clone)]
pub struct ToolCatalogEntry {
    pub path: String,
    pub description: String,
    pub approval_required: bool,
    pub args_type: String,
    pub returns_type: String,
}

pub fn catalog(tree: &ToolTree) -> Vec<ToolCatalogEntry> {
    let mut entries = Vec::new();
    tree.walk(|path, tool| {
        entries.push(ToolCatalogEntry {
            path: path.to_string(),
            description: tool.description.clone(),
            approval_required: matches!(tool.approval, crate::tool_tree::Approval::Required),
            args_type: render_type(&tool.args_schema),
            returns_type: render_type(&tool.returns_schema),
        });
    });
    entries
}

/// `renderSignatures` — one line per tool path, suitable for prompting.
pub fn render_signatures(tree: &ToolTree) -> String {
    let mut lines = Vec::new();
    for entry in catalog(tree) {
        let mode = if entry.approval_required {
            "approval required"
        } else {
            "auto"
        };
        lines.push(format!(
            "- {}({}): Promise<{}> [{}] — {}",
            entry.path, entry.args_type, entry.returns_type, mode, entry.description
        ));
    }
    lines.join("\n")
}

/// `renderDeclarations` — a `declare const tools: { … }` block mirroring the
/// tree's nesting, for hosts that want to static-check generated code.
pub fn render_declarations(tree: &ToolTree) -> String {
    let body = render_branch(tree.root_map(), 1);
    format!("declare const tools: {{\n{body}}};")
}

fn render_branch(map: &indexmap::IndexMap<String, crate::tool_tree::ToolNode>, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let mut body = String::new();
    for (name, node) in map {
        match node {
            crate::tool_tree::ToolNode::Leaf(tool) => {
                body.push_str(&format!(
                    "{indent}{name}({}): Promise<{}>;\n",
                    render_type(&tool.args_schema),
                    render_type(&tool.returns_schema)
                ));
            }
            crate::tool_tree::ToolNode::Branch(sub) => {
                body.push_str(&format!("{indent}{name}: {{\n"));
                body.push_str(&render_branch(sub, depth + 1));
                body.push_str(&format!("{indent}}};\n"));
            }
        }
    }
    body
}

/// Render a JSON schema as a terse type-signature fragment. Never panics —
/// unrecognized shapes fall back to `unknown`.
fn render_type(schema: &Value) -> String {
    let Value::Object(obj) = schema else {
        return "unknown".to_string();
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("object") => {
            let Some(Value::Object(props)) = obj.get("properties") else {
                return "Record<string, unknown>".to_string();
            };
            let required: Vec<&str> = obj
                .get("required")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let mut fields: Vec<String> = props
                .iter()
                .map(|(name, sub)| {
                    let optional = if required.contains(&name.as_str()) {
                        ""
                    } else {
                        "?"
                    };
                    format!("{name}{optional}: {}", render_type(sub))
                })
                .collect();
            fields.sort();
            format!("{{ {} }}", fields.join("; "))
        }
        Some("array") => {
            let item_type = obj
                .get("items")
                .map(render_type)
                .unwrap_or_else(|| "unknown".to_string());
            format!("{item_type}[]")
        }
        Some("string") => "string".to_string(),
        Some("number") | Some("integer") => "number".to_string(),
        Some("boolean") => "boolean".to_string(),
        Some("null") => "null".to_string(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_tree::{Approval, Tool, ToolTree};
    use serde_json::json;
    use std::sync::Arc;

    fn tree() -> ToolTree {
        ToolTree::build(|b| {
            b.define(
                "echo",
                Tool {
                    description: "echoes input".into(),
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
                    executor: Arc::new(|v: Value| async move { Ok(v) }),
                    format_approval: None,
                },
            );
        })
    }

    #[test]
    fn render_signatures_is_deterministic() {
        let t = tree();
        let a = render_signatures(&t);
        let b = render_signatures(&t);
        assert_eq!(a, b);
        assert!(a.contains("echo({ message: string }): Promise<{ echoed: string }> [auto]"));
    }

    #[test]
    fn unknown_schema_shapes_render_as_unknown() {
        assert_eq!(render_type(&json!(null)), "unknown");
        assert_eq!(render_type(&json!({"type": "banana"})), "banana");
    }

    #[test]
    fn render_declarations_never_panics_on_empty_tree() {
        let empty = ToolTree::new();
        let decl = render_declarations(&empty);
        assert!(decl.starts_with("declare const tools:"));
    }

    #[test]
    fn render_declarations_nests_namespaces_as_braces() {
        let tree = ToolTree::build(|b| {
            b.define(
                "github.issues.close",
                Tool {
                    description: "closes an issue".into(),
                    approval: Approval::Required,
                    args_schema: json!({
                        "type": "object",
                        "properties": {"id": {"type": "number"}},
                        "required": ["id"]
                    }),
                    returns_schema: json!({
                        "type": "object",
                        "properties": {"closed": {"type": "boolean"}},
                        "required": ["closed"]
                    }),
                    executor: Arc::new(|v: Value| async move { Ok(v) }),
                    format_approval: None,
                },
            );
        });

        let decl = render_declarations(&tree);
        assert!(decl.contains("github: {\n"));
        assert!(decl.contains("issues: {\n"));
        assert!(decl.contains("close({ id: number }): Promise<{ closed: boolean }>;"));
    }
}
