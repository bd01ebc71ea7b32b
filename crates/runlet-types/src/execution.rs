//! Execution tracking types for Runlet.
//!
//! One `Execution` is one run of a workflow, created when a trigger fires.
//! Each workflow node gets one pending `ExecutionInput` (removed from the
//! ready pool the moment it is dispatched) and, once the backend reports
//! back, exactly one write-once `ExecutionOutput`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::ParamSpec;

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }
}

/// One run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// UUIDv7 execution id.
    pub id: Uuid,
    /// Workflow being executed.
    pub workflow_id: Uuid,
    /// Workspace (tenant) the execution runs in.
    pub workspace_id: Uuid,
    /// Current status. Terminal once it leaves `Running`.
    pub status: ExecutionStatus,
    /// JSON payload from the trigger that started this run.
    pub trigger_payload: serde_json::Value,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// How many times this execution has been retried.
    #[serde(default)]
    pub retry_count: u32,
    /// Maximum execution-level retries.
    #[serde(default)]
    pub max_retries: u32,
    /// Whether this execution is itself a retry of another.
    #[serde(default)]
    pub is_retry: bool,
    /// The execution this one retries, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<Uuid>,
    /// Error message if the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured error details if the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ExecutionInput
// ---------------------------------------------------------------------------

/// Lifecycle state of a pending invocation.
///
/// `Dispatched` is the explicit soft-delete tag: a dispatched input never
/// reappears in a ready batch, but the row survives for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputState {
    Pending,
    Dispatched,
}

/// One pending, not-yet-dispatched invocation of one workflow node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInput {
    /// UUIDv7 input id.
    pub id: Uuid,
    /// Execution this invocation belongs to.
    pub execution_id: Uuid,
    /// Node id within the workflow.
    pub node_id: String,
    /// Workspace the execution runs in (denormalized for tenant checks).
    pub workspace_id: Uuid,
    /// Script the execution backend runs.
    pub script_ref: String,
    /// Unresolved parameter map, copied from the node definition.
    pub params: HashMap<String, ParamSpec>,
    /// Number of not-yet-completed upstream nodes. Never below zero.
    pub dependency_count: u32,
    /// Scheduling priority (higher dispatches first).
    pub priority: i32,
    /// Aging counter: incremented each time a dispatchable input is passed
    /// over by a ready batch, so it eventually outranks its peers.
    pub wait_factor: u32,
    /// How many times this node has been retried.
    pub retry_count: u32,
    /// Maximum node-level retries.
    pub max_retries: u32,
    /// Node-level execution timeout in seconds.
    pub timeout_secs: u64,
    /// Pending or dispatched (soft-deleted).
    pub state: InputState,
    /// When the input was dispatched, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl ExecutionInput {
    /// Whether this input can be dispatched right now.
    pub fn is_dispatchable(&self) -> bool {
        self.state == InputState::Pending
            && self.dependency_count == 0
            && self.retry_count < self.max_retries
    }
}

// ---------------------------------------------------------------------------
// ExecutionOutput
// ---------------------------------------------------------------------------

/// Status of one completed node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Success,
    Failed,
    Timeout,
    Cancelled,
}

/// The recorded result of one node invocation. Write-once: at most one
/// output exists per (execution, node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// UUIDv7 output id.
    pub id: Uuid,
    /// Execution the node ran in.
    pub execution_id: Uuid,
    /// Node id within the workflow.
    pub node_id: String,
    /// How the invocation ended.
    pub status: NodeRunStatus,
    /// JSON result produced by the node's script.
    pub result_data: serde_json::Value,
    /// Wall-clock duration of the invocation in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Peak memory used by the invocation, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<u64>,
    /// Error message if the invocation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured error details if the invocation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
    /// Retry attempt this result came from.
    #[serde(default)]
    pub retry_count: u32,
    /// When the result was ingested.
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// NodeResult (ingestion payload)
// ---------------------------------------------------------------------------

/// A node result as reported by the execution backend, before it becomes a
/// persisted `ExecutionOutput`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeRunStatus,
    #[serde(default)]
    pub result_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,
    #[serde(default)]
    pub retry_count: u32,
}

impl NodeResult {
    /// Convert into a persisted output record with a fresh id.
    pub fn into_output(self) -> ExecutionOutput {
        ExecutionOutput {
            id: Uuid::now_v7(),
            execution_id: self.execution_id,
            node_id: self.node_id,
            status: self.status,
            result_data: self.result_data,
            duration_ms: self.duration_ms,
            peak_memory_bytes: self.peak_memory_bytes,
            error: self.error,
            error_details: self.error_details,
            retry_count: self.retry_count,
            recorded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
