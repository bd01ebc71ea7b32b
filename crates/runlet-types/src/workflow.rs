//! Workflow domain types for Runlet.
//!
//! A `Workflow` is the stored graph a trigger event runs against: a set of
//! node definitions plus the directed edges between them. Workflows are
//! read-only during execution; the execution-tracking types live in
//! [`crate::execution`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A stored workflow graph: nodes plus directed dependency edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Workspace (tenant) that owns this workflow.
    pub workspace_id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Node definitions. Node ids are unique within a workflow.
    pub nodes: Vec<NodeDefinition>,
    /// Directed dependency edges between nodes.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// When the workflow was first saved.
    pub created_at: DateTime<Utc>,
    /// When the workflow was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Look up a node definition by its id.
    pub fn node(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == node_id)
    }
}

// ---------------------------------------------------------------------------
// Node definition
// ---------------------------------------------------------------------------

/// One node of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// User-defined node id (e.g. "NOD-1"). Unique within a workflow.
    pub id: String,
    /// Human-readable node name.
    pub name: String,
    /// Reference to the script the execution backend runs for this node.
    pub script_ref: String,
    /// Unresolved parameter map. Values are literals or `${kind:id.path}`
    /// reference strings; resolution happens at dispatch time.
    #[serde(default)]
    pub params: HashMap<String, ParamSpec>,
    /// Scheduling priority (higher dispatches first).
    #[serde(default)]
    pub priority: i32,
    /// Node-level execution timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum retry attempts for this node.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

/// One unresolved parameter entry: the raw value plus its declared type.
///
/// The raw value is either a literal (merged into the resolved map
/// unchanged) or a reference string. The declared type drives coercion of
/// the resolved value; when absent, the resolved value passes through
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Literal JSON value or a `${kind:identifier[.path]}` reference string.
    pub value: serde_json::Value,
    /// Declared target type name (e.g. "string", "integer", "boolean").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
}

impl ParamSpec {
    /// A literal parameter with no declared type.
    pub fn literal(value: serde_json::Value) -> Self {
        Self {
            value,
            expected_type: None,
        }
    }

    /// A reference (or literal) with a declared target type.
    pub fn typed(value: impl Into<String>, expected_type: impl Into<String>) -> Self {
        Self {
            value: serde_json::Value::String(value.into()),
            expected_type: Some(expected_type.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// A directed dependency edge: `from_node_id` must complete before
/// `to_node_id` may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Workflow this edge belongs to.
    pub workflow_id: Uuid,
    /// Upstream node id.
    pub from_node_id: String,
    /// Downstream node id.
    pub to_node_id: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
