//! Workflow graph validation and dependency seeding.
//!
//! Uses `petgraph` to model node dependencies as a directed graph.
//! Topological sort detects cycles before an execution is seeded; the
//! indegree map supplies each node's starting `dependency_count`.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use runlet_types::error::SchedulerError;
use runlet_types::workflow::Workflow;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a workflow's nodes and edges form a DAG.
///
/// Fails when an edge references a node id the workflow doesn't define, or
/// when the edges contain a cycle.
pub fn validate_graph(workflow: &Workflow) -> Result<(), SchedulerError> {
    let id_to_idx: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = workflow
        .nodes
        .iter()
        .map(|n| graph.add_node(n.id.as_str()))
        .collect();

    for edge in &workflow.edges {
        let from_idx = id_to_idx.get(edge.from_node_id.as_str()).ok_or_else(|| {
            SchedulerError::InvalidGraph(format!(
                "edge references unknown node '{}'",
                edge.from_node_id
            ))
        })?;
        let to_idx = id_to_idx.get(edge.to_node_id.as_str()).ok_or_else(|| {
            SchedulerError::InvalidGraph(format!(
                "edge references unknown node '{}'",
                edge.to_node_id
            ))
        })?;
        graph.add_edge(node_indices[*from_idx], node_indices[*to_idx], ());
    }

    toposort(&graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        SchedulerError::InvalidGraph(format!("cycle detected involving node '{node_id}'"))
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Indegree seeding
// ---------------------------------------------------------------------------

/// Number of distinct incoming edges per node.
///
/// Duplicate `(from, to)` pairs count once: completion of an upstream node
/// decrements a downstream input exactly once, so the seeded count must
/// match that.
pub fn indegree_counts(workflow: &Workflow) -> HashMap<&str, u32> {
    let mut counts: HashMap<&str, u32> = workflow
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for edge in &workflow.edges {
        let pair = (edge.from_node_id.as_str(), edge.to_node_id.as_str());
        if seen.insert(pair) {
            if let Some(count) = counts.get_mut(edge.to_node_id.as_str()) {
                *count += 1;
            }
        }
    }

    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
