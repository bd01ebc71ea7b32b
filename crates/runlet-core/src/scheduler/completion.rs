//! Completion detection for one execution.
//!
//! Pure decision logic, applied after each ingested output:
//! 1. A FAILED output fails the whole execution immediately (fail-fast;
//!    no waiting for sibling nodes).
//! 2. When the output count reaches the workflow's node count, the
//!    execution is terminal: FAILED if any recorded output is FAILED,
//!    COMPLETED otherwise.
//! 3. Anything else leaves the execution RUNNING.
//!
//! Timed-out and cancelled node outputs count toward completion but do
//! not fail the execution on their own.

use runlet_types::execution::{ExecutionStatus, NodeRunStatus};

/// Outcome of a completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionDecision {
    /// The execution keeps running.
    InProgress,
    /// The execution reached a terminal status.
    Terminal(ExecutionStatus),
}

/// Decide whether the execution is complete after ingesting one output.
///
/// `recorded_outputs` is the total number of outputs for the execution
/// *including* the one just ingested; `any_failed` covers the same set.
pub fn evaluate(
    incoming: NodeRunStatus,
    recorded_outputs: u64,
    total_nodes: u64,
    any_failed: bool,
) -> CompletionDecision {
    if incoming == NodeRunStatus::Failed {
        return CompletionDecision::Terminal(ExecutionStatus::Failed);
    }

    if recorded_outputs >= total_nodes {
        let status = if any_failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        return CompletionDecision::Terminal(status);
    }

    CompletionDecision::InProgress
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
