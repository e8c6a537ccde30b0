//! Default approval-preview inference (§4.C.3.a).
//!
//! Used when a tool does not supply its own `format_approval`. Infers a verb
//! from the tool path, a resource type from the penultimate path segment,
//! and candidate resource ids from well-known input keys.

use serde_json::Value;

/// What a human reviewing an approval request sees.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalPreview {
    pub title: String,
    pub details: Option<String>,
    pub link: Option<String>,
}

const CANDIDATE_ID_KEYS: &[&str] = &["id", "ids", "name", "slug", "key", "idOrName"];

fn infer_verb(path: &str) -> &'static str {
    let leaf = path.rsplit('.').next().unwrap_or(path).to_ascii_lowercase();
    if ["delete", "remove", "destroy", "purge"]
        .iter()
        .any(|v| leaf.contains(v))
    {
        "delete"
    } else if ["create", "add", "insert", "provision"]
        .iter()
        .any(|v| leaf.contains(v))
    {
        "create"
    } else if ["update", "set", "patch", "edit", "rename"]
        .iter()
        .any(|v| leaf.contains(v))
    {
        "update"
    } else if ["get", "list", "search", "find", "read"]
        .iter()
        .any(|v| leaf.contains(v))
    {
        "read"
    } else {
        "execute"
    }
}

fn resource_type(path: &str) -> Option<&str> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.len() >= 2 {
        Some(segments[segments.len() - 2])
    } else {
        None
    }
}

fn candidate_ids(input: &Value) -> Vec<String> {
    let Value::Object(map) = input else {
        return Vec::new();
    };
    let mut ids = Vec::new();
    for key in CANDIDATE_ID_KEYS {
        if let Some(value) = map.get(*key) {
            match value {
                Value::String(s) => ids.push(s.clone()),
                Value::Array(arr) => {
                    for item in arr {
                        if let Value::String(s) = item {
                            ids.push(s.clone());
                        }
                    }
                }
                Value::Number(n) => ids.push(n.to_string()),
                _ => {}
            }
        }
    }
    ids
}

/// Build a default approval preview for a tool call at `path`.
pub fn infer_preview(path: &str, input: &Value) -> ApprovalPreview {
    let verb = infer_verb(path);
    let resource = resource_type(path);
    let ids = candidate_ids(input);

    let title = match (resource, ids.is_empty()) {
        (Some(resource), false) => format!("{verb} {resource} {}", ids.join(", ")),
        (Some(resource), true) => format!("{verb} {resource}"),
        (None, false) => format!("{verb} {}", ids.join(", ")),
        (None, true) => format!("{verb} {path}"),
    };

    ApprovalPreview {
        title,
        details: Some(path.to_string()),
        link: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_resource_and_ids_with_default_verb() {
        let preview = infer_preview("github.issues.close", &json!({"id": "42"}));
        assert_eq!(preview.title, "execute issues 42");
    }

    #[test]
    fn infers_destructive_verb() {
        let preview = infer_preview("files.delete", &json!({"name": "a.txt"}));
        assert_eq!(preview.title, "delete files a.txt");
    }

    #[test]
    fn falls_back_to_path_when_no_ids() {
        let preview = infer_preview("danger.delete", &json!({}));
        assert_eq!(preview.title, "delete danger");
    }
}
