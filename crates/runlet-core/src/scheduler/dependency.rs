//! Dependency propagation: the sole blocked-to-ready mechanism.
//!
//! When a node completes, every pending input of its downstream nodes in
//! the same execution has its `dependency_count` decremented by exactly
//! one, clamped at zero. The batch decrement itself is one atomic store
//! operation; this module owns the edge lookup and target de-duplication.

use std::collections::HashSet;

use runlet_types::error::SchedulerError;
use uuid::Uuid;

use crate::repository::SchedulerStore;

/// Propagate the completion of `completed_node_id` to its downstream
/// inputs. Returns the number of inputs updated; no outgoing edges is a
/// no-op returning 0.
pub async fn propagate_completion<S: SchedulerStore>(
    store: &S,
    workflow_id: &Uuid,
    execution_id: &Uuid,
    completed_node_id: &str,
) -> Result<u64, SchedulerError> {
    let edges = store.edges_from(workflow_id, completed_node_id).await?;
    if edges.is_empty() {
        return Ok(0);
    }

    // De-duplicate targets: a doubled edge must not decrement twice.
    let mut seen = HashSet::new();
    let targets: Vec<String> = edges
        .into_iter()
        .map(|e| e.to_node_id)
        .filter(|t| seen.insert(t.clone()))
        .collect();

    let updated = store.decrement_dependencies(execution_id, &targets).await?;
    tracing::debug!(
        %execution_id,
        completed_node_id,
        targets = targets.len(),
        updated,
        "propagated node completion"
    );

    Ok(updated)
}
