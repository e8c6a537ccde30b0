use serde::{Deserialize, Serialize};

/// How a pending approval was (or will be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Denied,
}

/// Comparison operator for a rule's field check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Includes,
    NotIncludes,
}

/// A declarative auto-decision condition for one task. Evaluated against
/// `input.field` (dot-path) after string coercion (§9 open question:
/// exact-string-equality semantics, non-string fields never match).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub tool_path: String,
    pub field: String,
    pub operator: Operator,
    pub value: String,
    pub decision: Decision,
}
