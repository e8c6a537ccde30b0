//! Tool tree — namespaced set of typed tool definitions.
//!
//! A [`ToolTree`] is a finite, acyclic mapping from names to subtrees or
//! leaves. A node is either a [`Tool`] (leaf) or a [`Branch`] (map of names
//! to nodes) — never both at the same key.

mod preview;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

pub use preview::{infer_preview, ApprovalPreview};

/// Whether a tool call must be approved before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Approval {
    Auto,
    Required,
}

/// Result of calling a tool's executor.
pub type ToolOutput = Result<Value, ToolError>;

/// A tool execution failure. Nested causes are joined as the spec requires:
/// `"msg (cause: …)"`.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub message: String,
    pub cause: Option<Box<ToolError>>,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: ToolError) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Render as `"msg (cause: …)"`, recursively.
    pub fn display_chain(&self) -> String {
        match &self.cause {
            Some(cause) => format!("{} (cause: {})", self.message, cause.display_chain()),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_chain())
    }
}

impl std::error::Error for ToolError {}

/// Executor trait for a tool leaf. `run` receives input already validated
/// against `args_schema`; the returns-side schema is descriptive only (not
/// enforced, per spec).
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn run(&self, input: Value) -> ToolOutput;
}

#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ToolOutput> + Send,
{
    async fn run(&self, input: Value) -> ToolOutput {
        (self)(input).await
    }
}

/// Formats an approval-preview for a tool call given its validated input.
/// Defaults to [`infer_preview`] when a tool does not supply one.
pub trait FormatApproval: Send + Sync {
    fn format(&self, input: &Value) -> ApprovalPreview;
}

impl<F> FormatApproval for F
where
    F: Fn(&Value) -> ApprovalPreview + Send + Sync,
{
    fn format(&self, input: &Value) -> ApprovalPreview {
        (self)(input)
    }
}

/// A tool leaf: identity, schemas, approval mode, and executor.
pub struct Tool {
    pub description: String,
    pub approval: Approval,
    pub args_schema: Value,
    pub returns_schema: Value,
    pub executor: Arc<dyn ToolExecutor>,
    pub format_approval: Option<Arc<dyn FormatApproval>>,
}

impl Tool {
    /// Build the approval preview for a call, using the tool's custom
    /// formatter if present, else the path-based inference in §4.C.3.a.
    pub fn approval_preview(&self, path: &str, input: &Value) -> ApprovalPreview {
        match &self.format_approval {
            Some(f) => f.format(input),
            None => infer_preview(path, input),
        }
    }
}

/// One node of the tree: a leaf tool, or a named subtree.
pub enum ToolNode {
    Leaf(Arc<Tool>),
    Branch(IndexMap<String, ToolNode>),
}

impl ToolNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, ToolNode::Leaf(_))
    }
}

/// The tool tree itself — a named root [`ToolNode::Branch`].
#[derive(Clone)]
pub struct ToolTree {
    root: Arc<IndexMap<String, ToolNode>>,
}

impl Default for ToolTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolTree {
    pub fn new() -> Self {
        Self {
            root: Arc::new(IndexMap::new()),
        }
    }

    fn from_map(map: IndexMap<String, ToolNode>) -> Self {
        Self {
            root: Arc::new(map),
        }
    }

    /// Build a tool tree from a builder over a fresh [`ToolTreeBuilder`].
    pub fn build(f: impl FnOnce(&mut ToolTreeBuilder)) -> Self {
        let mut builder = ToolTreeBuilder::default();
        f(&mut builder);
        Self::from_map(builder.into_map())
    }

    /// Look up a tool by its dot-path.
    pub fn get(&self, path: &str) -> Option<Arc<Tool>> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.root.get(first)?;
        for segment in segments {
            match node {
                ToolNode::Branch(map) => node = map.get(segment)?,
                ToolNode::Leaf(_) => return None,
            }
        }
        match node {
            ToolNode::Leaf(tool) => Some(tool.clone()),
            ToolNode::Branch(_) => None,
        }
    }

    /// Stable depth-first traversal in insertion order, each tool visited once.
    pub fn walk(&self, mut visit: impl FnMut(&str, &Tool)) {
        fn walk_map(prefix: &str, map: &IndexMap<String, ToolNode>, visit: &mut impl FnMut(&str, &Tool)) {
            for (name, node) in map {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match node {
                    ToolNode::Leaf(tool) => visit(&path, tool),
                    ToolNode::Branch(sub) => walk_map(&path, sub, visit),
                }
            }
        }
        walk_map("", &self.root, &mut visit);
    }

    /// Merge two trees. Commutative on disjoint subtrees, associative.
    /// Leaf/leaf or leaf/branch conflicts at the same key are resolved
    /// last-writer-wins: `other` wins.
    pub fn merge(self, other: ToolTree) -> ToolTree {
        let merged = merge_maps((*self.root).clone(), (*other.root).clone());
        ToolTree::from_map(merged)
    }

    /// Direct access to the root node map, for hosts (the sandbox engine)
    /// that need to mirror the tree's nesting rather than flatten it.
    pub(crate) fn root_map(&self) -> &IndexMap<String, ToolNode> {
        &self.root
    }

    pub fn all_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.walk(|path, _| paths.push(path.to_string()));
        paths
    }
}

fn merge_maps(
    mut base: IndexMap<String, ToolNode>,
    overlay: IndexMap<String, ToolNode>,
) -> IndexMap<String, ToolNode> {
    for (key, node) in overlay {
        match (base.shift_remove(&key), node) {
            (Some(ToolNode::Branch(existing)), ToolNode::Branch(incoming)) => {
                base.insert(key, ToolNode::Branch(merge_maps(existing, incoming)));
            }
            (_, incoming) => {
                // Last-writer-wins for leaf/leaf and leaf/branch conflicts.
                base.insert(key, incoming);
            }
        }
    }
    base
}

/// Helper used by [`ToolTree::build`] to register nested tools by dot-path.
#[derive(Default)]
pub struct ToolTreeBuilder {
    map: IndexMap<String, ToolNode>,
}

impl ToolTreeBuilder {
    /// Register a leaf tool at `path` (dot-separated namespace).
    pub fn define(&mut self, path: &str, tool: Tool) -> &mut Self {
        insert_leaf(&mut self.map, path, Arc::new(tool));
        self
    }

    fn into_map(self) -> IndexMap<String, ToolNode> {
        self.map
    }
}

fn insert_leaf(map: &mut IndexMap<String, ToolNode>, path: &str, tool: Arc<Tool>) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().expect("tool path must be non-empty");

    let mut current = map;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| ToolNode::Branch(IndexMap::new()));
        match entry {
            ToolNode::Branch(sub) => current = sub,
            ToolNode::Leaf(_) => {
                // A leaf already occupies this path segment; overwrite with a
                // branch so deeper definitions still succeed (documented
                // last-writer-wins behavior, same as `merge`).
                *entry = ToolNode::Branch(IndexMap::new());
                match entry {
                    ToolNode::Branch(sub) => current = sub,
                    ToolNode::Leaf(_) => unreachable!(),
                }
            }
        }
    }
    current.insert(last.to_string(), ToolNode::Leaf(tool));
}

/// Tool category inferred from its dot-path, used for approval-preview
/// defaults and for the `tool_result` reducer icon (§4.G).
pub fn destructive_verbs() -> &'static BTreeSet<&'static str> {
    static VERBS: once_cell::sync::Lazy<BTreeSet<&'static str>> =
        once_cell::sync::Lazy::new(|| ["delete", "remove", "destroy", "purge"].into_iter().collect());
    &VERBS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_tool(approval: Approval) -> Tool {
        Tool {
            description: "test".into(),
            approval,
            args_schema: json!({"type": "object"}),
            returns_schema: json!({"type": "object"}),
            executor: Arc::new(|input: Value| async move { Ok(input) }),
            format_approval: None,
        }
    }

    #[test]
    fn define_and_get_nested() {
        let tree = ToolTree::build(|b| {
            b.define("github.issues.close", noop_tool(Approval::Required));
        });
        assert!(tree.get("github.issues.close").is_some());
        assert!(tree.get("github.issues").is_none());
        assert!(tree.get("nope").is_none());
    }

    #[test]
    fn walk_visits_each_tool_once_in_insertion_order() {
        let tree = ToolTree::build(|b| {
            b.define("b.tool", noop_tool(Approval::Auto));
            b.define("a.tool", noop_tool(Approval::Auto));
        });
        let mut seen = Vec::new();
        tree.walk(|path, _| seen.push(path.to_string()));
        assert_eq!(seen, vec!["b.tool".to_string(), "a.tool".to_string()]);
    }

    #[test]
    fn merge_is_commutative_on_disjoint_subtrees() {
        let left = ToolTree::build(|b| {
            b.define("a.one", noop_tool(Approval::Auto));
        });
        let right = ToolTree::build(|b| {
            b.define("b.two", noop_tool(Approval::Auto));
        });
        let merged_lr = left.clone().merge(right.clone());
        let merged_rl = right.merge(left);
        assert_eq!(merged_lr.all_paths().len(), 2);
        assert_eq!(merged_rl.all_paths().len(), 2);
    }

    #[test]
    fn merge_leaf_conflict_is_last_writer_wins() {
        let left = ToolTree::build(|b| {
            b.define("x", noop_tool(Approval::Auto));
        });
        let right = ToolTree::build(|b| {
            b.define("x", noop_tool(Approval::Required));
        });
        let merged = left.merge(right);
        assert_eq!(merged.get("x").unwrap().approval, Approval::Required);
    }
}
