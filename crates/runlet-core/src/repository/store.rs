//! Storage, lifecycle, cipher, and file-access port traits.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait
//! macro). Composite operations marked *atomic* must be applied inside one
//! storage transaction by the implementation; the decision logic they apply
//! (readiness selection, clamped decrements) lives in this crate's
//! `scheduler` modules so every implementation shares one policy.

use runlet_types::error::{RepositoryError, SecretError};
use runlet_types::execution::{Execution, ExecutionInput, ExecutionOutput, ExecutionStatus};
use runlet_types::resource::{Credential, DatabaseConnection, StoredFile, Variable};
use runlet_types::workflow::{Edge, Workflow};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SchedulerStore
// ---------------------------------------------------------------------------

/// Storage interface for workflows, executions, inputs, and outputs.
pub trait SchedulerStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows & edges
    // -----------------------------------------------------------------------

    /// Get a workflow (nodes + edges) by id.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// All edges of a workflow leaving `from_node_id`.
    fn edges_from(
        &self,
        workflow_id: &Uuid,
        from_node_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Edge>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Persist a new execution record.
    fn insert_execution(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by id.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Execution inputs
    // -----------------------------------------------------------------------

    /// Persist the seeded inputs for a new execution.
    fn insert_inputs(
        &self,
        inputs: &[ExecutionInput],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an input by id. Dispatched (soft-deleted) inputs are only
    /// returned when `include_dispatched` is set.
    fn get_input(
        &self,
        id: &Uuid,
        include_dispatched: bool,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionInput>, RepositoryError>> + Send;

    /// *Atomic.* Select up to `batch_size` dispatchable inputs and age the
    /// dispatchable inputs that were passed over, applying
    /// [`crate::scheduler::readiness::select_batch`] in one transaction.
    /// Returns the selected inputs in dispatch order.
    fn claim_ready_batch(
        &self,
        batch_size: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionInput>, RepositoryError>> + Send;

    /// *Atomic.* Decrement `dependency_count` by exactly 1 (never below
    /// zero) for the pending inputs of the given target nodes within one
    /// execution. Returns the number of inputs updated.
    fn decrement_dependencies(
        &self,
        execution_id: &Uuid,
        target_node_ids: &[String],
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Soft-delete inputs that were handed to the execution backend, so
    /// they never reappear in a ready batch. Returns the number updated.
    fn mark_inputs_dispatched(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Soft-delete every remaining pending input of an execution (terminal
    /// transition cleanup). Returns the number updated.
    fn discard_inputs_for_execution(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Execution outputs
    // -----------------------------------------------------------------------

    /// *Atomic.* Persist a node output and return the total number of
    /// outputs recorded for its execution, counted in the same transaction.
    /// A second output for the same (execution, node) fails with
    /// [`RepositoryError::Conflict`].
    fn insert_output(
        &self,
        output: &ExecutionOutput,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// All outputs recorded for an execution so far.
    fn outputs_for_execution(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionOutput>, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// ResourceStore
// ---------------------------------------------------------------------------

/// Batch reads for the workspace resources parameter references point at.
/// Implementations return only the rows that exist; missing ids surface as
/// resolution errors at the call site.
pub trait ResourceStore: Send + Sync {
    fn variables_by_ids(
        &self,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Variable>, RepositoryError>> + Send;

    fn credentials_by_ids(
        &self,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Credential>, RepositoryError>> + Send;

    fn databases_by_ids(
        &self,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<DatabaseConnection>, RepositoryError>> + Send;

    fn files_by_ids(
        &self,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<StoredFile>, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// ExecutionLifecycle
// ---------------------------------------------------------------------------

/// Owns terminal transitions: stamps `ended_at` and persists the final
/// status. Implementations must be idempotent -- ending an execution that
/// already left `Running` is a no-op.
pub trait ExecutionLifecycle: Send + Sync {
    fn end_execution(
        &self,
        execution_id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// SecretCipher
// ---------------------------------------------------------------------------

/// Opaque decrypt capability for secret variables and credentials.
pub trait SecretCipher: Send + Sync {
    /// Decrypt base64-encoded ciphertext to plaintext.
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError>;
}

// ---------------------------------------------------------------------------
// WorkspaceFiles
// ---------------------------------------------------------------------------

/// Read access to workspace file storage.
pub trait WorkspaceFiles: Send + Sync {
    /// Read a file's bytes by workspace-relative path.
    fn read(
        &self,
        workspace_id: &Uuid,
        relative_path: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, RepositoryError>> + Send;
}
