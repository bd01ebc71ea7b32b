//! Ready-batch selection with wait-factor aging.
//!
//! The policy is a pure function over a snapshot of pending inputs, so
//! every store implementation applies the same ordering and aging inside
//! its own transaction: dispatchable inputs order by `priority DESC,
//! wait_factor DESC`, the first `batch_size` are selected, and every
//! dispatchable input passed over ages by one so it eventually outranks
//! the inputs that keep beating it.

use runlet_types::execution::ExecutionInput;
use uuid::Uuid;

/// Outcome of one selection round.
#[derive(Debug, Default)]
pub struct ReadySelection {
    /// Inputs to dispatch, in order.
    pub selected: Vec<ExecutionInput>,
    /// Ids of dispatchable inputs that were passed over; their
    /// `wait_factor` must be incremented by 1 in the same transaction.
    pub aged: Vec<Uuid>,
}

/// Select up to `batch_size` dispatchable inputs from a snapshot of
/// pending inputs, and name the passed-over inputs to age.
///
/// Inputs that are blocked (`dependency_count > 0`) or retry-exhausted are
/// neither selected nor aged.
pub fn select_batch(pending: Vec<ExecutionInput>, batch_size: usize) -> ReadySelection {
    let mut dispatchable: Vec<ExecutionInput> = pending
        .into_iter()
        .filter(ExecutionInput::is_dispatchable)
        .collect();

    // Highest priority first; within equal priority, the longest-waiting
    // first. The sort is stable, so remaining ties keep snapshot order.
    dispatchable.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.wait_factor.cmp(&a.wait_factor))
    });

    let aged = dispatchable
        .iter()
        .skip(batch_size)
        .map(|input| input.id)
        .collect();
    dispatchable.truncate(batch_size);

    ReadySelection {
        selected: dispatchable,
        aged,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
