//! The scheduler facade: the operations the rest of the system calls.
//!
//! `ExecutionScheduler` composes the reference resolver, dependency
//! propagation, readiness policy, and completion detection over the port
//! traits. It owns no threads -- external callers poll for ready inputs,
//! dispatch them to an execution backend, and feed results back in. All
//! collaborators arrive through the constructor, so tests substitute
//! in-memory implementations.

use chrono::Utc;
use runlet_types::error::SchedulerError;
use runlet_types::execution::{
    Execution, ExecutionInput, ExecutionStatus, InputState, NodeResult, NodeRunStatus,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::reference::resolver::ParameterResolver;
use crate::repository::{
    ExecutionLifecycle, ResourceStore, SchedulerStore, SecretCipher, WorkspaceFiles,
};

use super::completion::{self, CompletionDecision};
use super::dependency;
use super::graph;

// ---------------------------------------------------------------------------
// Facade outputs
// ---------------------------------------------------------------------------

/// Everything the execution backend needs to run one node invocation.
#[derive(Debug, Clone)]
pub struct NodeExecutionContext {
    pub execution_id: Uuid,
    pub node_id: String,
    pub script_ref: String,
    /// Fully resolved, flat parameter map.
    pub params: Map<String, Value>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

/// Outcome of ingesting one node result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultIngestion {
    /// The terminal status reached by this ingestion, if any.
    pub terminal_status: Option<ExecutionStatus>,
    /// Downstream inputs unblocked-toward by dependency propagation.
    pub dependents_updated: u64,
}

// ---------------------------------------------------------------------------
// ExecutionScheduler
// ---------------------------------------------------------------------------

/// Facade over the scheduling core.
///
/// Generic over the storage, lifecycle, cipher, and file ports; the
/// infrastructure layer supplies sqlx-backed implementations.
pub struct ExecutionScheduler<S, L, C, W>
where
    S: SchedulerStore + ResourceStore,
    L: ExecutionLifecycle,
    C: SecretCipher,
    W: WorkspaceFiles,
{
    store: S,
    lifecycle: L,
    cipher: C,
    files: W,
}

impl<S, L, C, W> ExecutionScheduler<S, L, C, W>
where
    S: SchedulerStore + ResourceStore,
    L: ExecutionLifecycle,
    C: SecretCipher,
    W: WorkspaceFiles,
{
    pub fn new(store: S, lifecycle: L, cipher: C, files: W) -> Self {
        Self {
            store,
            lifecycle,
            cipher,
            files,
        }
    }

    // -----------------------------------------------------------------------
    // Execution start
    // -----------------------------------------------------------------------

    /// Start an execution of a workflow: validate the graph, create the
    /// execution in `Running` state, and seed one pending input per node
    /// with its dependency count taken from the edge indegrees.
    pub async fn start_execution(
        &self,
        workflow_id: &Uuid,
        trigger_payload: Value,
    ) -> Result<Execution, SchedulerError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(SchedulerError::WorkflowNotFound(*workflow_id))?;

        graph::validate_graph(&workflow)?;
        let indegrees = graph::indegree_counts(&workflow);

        let execution = Execution {
            id: Uuid::now_v7(),
            workflow_id: workflow.id,
            workspace_id: workflow.workspace_id,
            status: ExecutionStatus::Running,
            trigger_payload,
            started_at: Utc::now(),
            ended_at: None,
            retry_count: 0,
            max_retries: 0,
            is_retry: false,
            parent_execution_id: None,
            error: None,
            error_details: None,
        };

        let inputs: Vec<ExecutionInput> = workflow
            .nodes
            .iter()
            .map(|node| ExecutionInput {
                id: Uuid::now_v7(),
                execution_id: execution.id,
                node_id: node.id.clone(),
                workspace_id: workflow.workspace_id,
                script_ref: node.script_ref.clone(),
                params: node.params.clone(),
                dependency_count: indegrees.get(node.id.as_str()).copied().unwrap_or(0),
                priority: node.priority,
                wait_factor: 0,
                retry_count: 0,
                max_retries: node.max_retries,
                timeout_secs: node.timeout_secs,
                state: InputState::Pending,
                dispatched_at: None,
            })
            .collect();

        self.store.insert_execution(&execution).await?;
        self.store.insert_inputs(&inputs).await?;

        tracing::info!(
            execution_id = %execution.id,
            %workflow_id,
            nodes = inputs.len(),
            "execution started"
        );

        Ok(execution)
    }

    // -----------------------------------------------------------------------
    // Ready batch
    // -----------------------------------------------------------------------

    /// Select the next batch of dispatchable inputs. Selection and the
    /// aging of passed-over inputs happen in one store transaction.
    pub async fn get_ready_execution_inputs(
        &self,
        batch_size: usize,
    ) -> Result<Vec<ExecutionInput>, SchedulerError> {
        let selected = self.store.claim_ready_batch(batch_size).await?;
        tracing::debug!(batch_size, selected = selected.len(), "ready batch claimed");
        Ok(selected)
    }

    // -----------------------------------------------------------------------
    // Execution context
    // -----------------------------------------------------------------------

    /// Build the fully resolved context for one invocation. Read-only;
    /// any resolution failure aborts the whole context -- there is no
    /// partial parameter set.
    pub async fn create_execution_context(
        &self,
        execution_input_id: &Uuid,
    ) -> Result<NodeExecutionContext, SchedulerError> {
        let input = self
            .store
            .get_input(execution_input_id, false)
            .await?
            .ok_or(SchedulerError::InputNotFound(*execution_input_id))?;

        let execution = self
            .store
            .get_execution(&input.execution_id)
            .await?
            .ok_or(SchedulerError::ExecutionNotFound(input.execution_id))?;

        let resolver = ParameterResolver::new(&self.store, &self.cipher, &self.files);
        let params = resolver.resolve(&input, &execution).await?;

        Ok(NodeExecutionContext {
            execution_id: input.execution_id,
            node_id: input.node_id,
            script_ref: input.script_ref,
            params,
            max_retries: input.max_retries,
            timeout_secs: input.timeout_secs,
        })
    }

    // -----------------------------------------------------------------------
    // Result ingestion
    // -----------------------------------------------------------------------

    /// Ingest one node result: record the output, propagate dependencies
    /// for non-failed nodes, evaluate completion, and end the execution on
    /// a terminal transition.
    pub async fn process_execution_result(
        &self,
        result: NodeResult,
    ) -> Result<ResultIngestion, SchedulerError> {
        let execution = self
            .store
            .get_execution(&result.execution_id)
            .await?
            .ok_or(SchedulerError::ExecutionNotFound(result.execution_id))?;

        let incoming = result.status;
        let node_error = result.error.clone();
        let output = result.into_output();
        let node_id = output.node_id.clone();

        // Insert and count in one transaction; a duplicate result for the
        // same node surfaces as a conflict.
        let recorded_outputs = self.store.insert_output(&output).await?;

        let mut dependents_updated = 0;
        if incoming != NodeRunStatus::Failed {
            dependents_updated = dependency::propagate_completion(
                &self.store,
                &execution.workflow_id,
                &execution.id,
                &node_id,
            )
            .await?;
        }

        // Workflow-not-found here is fatal: the completion check cannot
        // run without the node count.
        let workflow = self
            .store
            .get_workflow(&execution.workflow_id)
            .await?
            .ok_or(SchedulerError::WorkflowNotFound(execution.workflow_id))?;

        let outputs = self.store.outputs_for_execution(&execution.id).await?;
        let any_failed = outputs.iter().any(|o| o.status == NodeRunStatus::Failed);

        let decision = completion::evaluate(
            incoming,
            recorded_outputs,
            workflow.nodes.len() as u64,
            any_failed,
        );

        match decision {
            CompletionDecision::InProgress => Ok(ResultIngestion {
                terminal_status: None,
                dependents_updated,
            }),
            CompletionDecision::Terminal(status) => {
                let error = match status {
                    ExecutionStatus::Failed => Some(
                        node_error.unwrap_or_else(|| format!("node '{node_id}' failed")),
                    ),
                    _ => None,
                };
                self.lifecycle
                    .end_execution(&execution.id, status, error.as_deref())
                    .await?;
                self.store.discard_inputs_for_execution(&execution.id).await?;

                tracing::info!(
                    execution_id = %execution.id,
                    ?status,
                    "execution finished"
                );

                Ok(ResultIngestion {
                    terminal_status: Some(status),
                    dependents_updated,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Input removal
    // -----------------------------------------------------------------------

    /// Soft-delete inputs that were dispatched to the execution backend,
    /// so they never reappear in a ready batch.
    pub async fn remove_processed_execution_inputs(
        &self,
        ids: &[Uuid],
    ) -> Result<u64, SchedulerError> {
        let updated = self.store.mark_inputs_dispatched(ids).await?;
        tracing::debug!(requested = ids.len(), updated, "inputs marked dispatched");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel a running execution and discard its pending inputs.
    pub async fn cancel_execution(&self, execution_id: &Uuid) -> Result<(), SchedulerError> {
        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or(SchedulerError::ExecutionNotFound(*execution_id))?;

        if execution.status.is_terminal() {
            return Err(SchedulerError::AlreadyFinished(*execution_id));
        }

        self.lifecycle
            .end_execution(execution_id, ExecutionStatus::Cancelled, None)
            .await?;
        self.store.discard_inputs_for_execution(execution_id).await?;

        tracing::info!(%execution_id, "execution cancelled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::readiness;
    use chrono::Utc;
    use runlet_types::error::{RepositoryError, SecretError};
    use runlet_types::execution::ExecutionOutput;
    use runlet_types::resource::{Credential, DatabaseConnection, StoredFile, Variable};
    use runlet_types::workflow::{Edge, NodeDefinition, ParamSpec, Workflow};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // -----------------------------------------------------------------------
    // In-memory backend
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct State {
        workflows: HashMap<Uuid, Workflow>,
        executions: HashMap<Uuid, Execution>,
        inputs: HashMap<Uuid, ExecutionInput>,
        outputs: Vec<ExecutionOutput>,
        variables: Vec<Variable>,
    }

    /// Shared-state in-memory backend implementing every port.
    #[derive(Clone, Default)]
    struct MemoryBackend {
        state: Arc<Mutex<State>>,
    }

    impl MemoryBackend {
        fn with_workflow(workflow: Workflow) -> Self {
            let backend = Self::default();
            backend
                .state
                .lock()
                .unwrap()
                .workflows
                .insert(workflow.id, workflow);
            backend
        }

        fn input_by_node(&self, execution_id: &Uuid, node_id: &str) -> ExecutionInput {
            self.state
                .lock()
                .unwrap()
                .inputs
                .values()
                .find(|i| i.execution_id == *execution_id && i.node_id == node_id)
                .cloned()
                .expect("input exists")
        }

        fn execution(&self, id: &Uuid) -> Execution {
            self.state
                .lock()
                .unwrap()
                .executions
                .get(id)
                .cloned()
                .expect("execution exists")
        }
    }

    impl SchedulerStore for MemoryBackend {
        async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
            Ok(self.state.lock().unwrap().workflows.get(id).cloned())
        }

        async fn edges_from(
            &self,
            workflow_id: &Uuid,
            from_node_id: &str,
        ) -> Result<Vec<Edge>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .workflows
                .get(workflow_id)
                .map(|wf| {
                    wf.edges
                        .iter()
                        .filter(|e| e.from_node_id == from_node_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn insert_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
            self.state
                .lock()
                .unwrap()
                .executions
                .insert(execution.id, execution.clone());
            Ok(())
        }

        async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
            Ok(self.state.lock().unwrap().executions.get(id).cloned())
        }

        async fn insert_inputs(&self, inputs: &[ExecutionInput]) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            for input in inputs {
                state.inputs.insert(input.id, input.clone());
            }
            Ok(())
        }

        async fn get_input(
            &self,
            id: &Uuid,
            include_dispatched: bool,
        ) -> Result<Option<ExecutionInput>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .inputs
                .get(id)
                .filter(|i| include_dispatched || i.state == InputState::Pending)
                .cloned())
        }

        async fn claim_ready_batch(
            &self,
            batch_size: usize,
        ) -> Result<Vec<ExecutionInput>, RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let pending: Vec<ExecutionInput> = state
                .inputs
                .values()
                .filter(|i| i.state == InputState::Pending)
                .cloned()
                .collect();

            let selection = readiness::select_batch(pending, batch_size);
            for id in &selection.aged {
                if let Some(input) = state.inputs.get_mut(id) {
                    input.wait_factor += 1;
                }
            }
            Ok(selection.selected)
        }

        async fn decrement_dependencies(
            &self,
            execution_id: &Uuid,
            target_node_ids: &[String],
        ) -> Result<u64, RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let mut updated = 0;
            for input in state.inputs.values_mut() {
                if input.execution_id == *execution_id
                    && input.state == InputState::Pending
                    && input.dependency_count > 0
                    && target_node_ids.contains(&input.node_id)
                {
                    input.dependency_count -= 1;
                    updated += 1;
                }
            }
            Ok(updated)
        }

        async fn mark_inputs_dispatched(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let mut updated = 0;
            for id in ids {
                if let Some(input) = state.inputs.get_mut(id) {
                    if input.state == InputState::Pending {
                        input.state = InputState::Dispatched;
                        input.dispatched_at = Some(Utc::now());
                        updated += 1;
                    }
                }
            }
            Ok(updated)
        }

        async fn discard_inputs_for_execution(
            &self,
            execution_id: &Uuid,
        ) -> Result<u64, RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let mut updated = 0;
            for input in state.inputs.values_mut() {
                if input.execution_id == *execution_id && input.state == InputState::Pending {
                    input.state = InputState::Dispatched;
                    input.dispatched_at = Some(Utc::now());
                    updated += 1;
                }
            }
            Ok(updated)
        }

        async fn insert_output(&self, output: &ExecutionOutput) -> Result<u64, RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let duplicate = state.outputs.iter().any(|o| {
                o.execution_id == output.execution_id && o.node_id == output.node_id
            });
            if duplicate {
                return Err(RepositoryError::Conflict(format!(
                    "output already recorded for node '{}'",
                    output.node_id
                )));
            }
            state.outputs.push(output.clone());
            Ok(state
                .outputs
                .iter()
                .filter(|o| o.execution_id == output.execution_id)
                .count() as u64)
        }

        async fn outputs_for_execution(
            &self,
            execution_id: &Uuid,
        ) -> Result<Vec<ExecutionOutput>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .outputs
                .iter()
                .filter(|o| o.execution_id == *execution_id)
                .cloned()
                .collect())
        }
    }

    impl ResourceStore for MemoryBackend {
        async fn variables_by_ids(&self, ids: &[String]) -> Result<Vec<Variable>, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .variables
                .iter()
                .filter(|v| ids.contains(&v.id))
                .cloned()
                .collect())
        }

        async fn credentials_by_ids(
            &self,
            _ids: &[String],
        ) -> Result<Vec<Credential>, RepositoryError> {
            Ok(vec![])
        }

        async fn databases_by_ids(
            &self,
            _ids: &[String],
        ) -> Result<Vec<DatabaseConnection>, RepositoryError> {
            Ok(vec![])
        }

        async fn files_by_ids(&self, _ids: &[String]) -> Result<Vec<StoredFile>, RepositoryError> {
            Ok(vec![])
        }
    }

    impl ExecutionLifecycle for MemoryBackend {
        async fn end_execution(
            &self,
            execution_id: &Uuid,
            status: ExecutionStatus,
            error: Option<&str>,
        ) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            if let Some(execution) = state.executions.get_mut(execution_id) {
                // Idempotent: only a running execution transitions.
                if execution.status == ExecutionStatus::Running {
                    execution.status = status;
                    execution.ended_at = Some(Utc::now());
                    execution.error = error.map(String::from);
                }
            }
            Ok(())
        }
    }

    struct NoopCipher;

    impl SecretCipher for NoopCipher {
        fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError> {
            Ok(ciphertext.to_string())
        }
    }

    struct NoFiles;

    impl WorkspaceFiles for NoFiles {
        async fn read(
            &self,
            _workspace_id: &Uuid,
            _relative_path: &str,
        ) -> Result<Vec<u8>, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
    }

    type TestScheduler = ExecutionScheduler<MemoryBackend, MemoryBackend, NoopCipher, NoFiles>;

    fn scheduler(backend: &MemoryBackend) -> TestScheduler {
        ExecutionScheduler::new(backend.clone(), backend.clone(), NoopCipher, NoFiles)
    }

    // -----------------------------------------------------------------------
    // Workflow fixtures
    // -----------------------------------------------------------------------

    fn node(id: &str) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            name: id.to_string(),
            script_ref: format!("scripts/{id}.py"),
            params: HashMap::new(),
            priority: 0,
            timeout_secs: 300,
            max_retries: 3,
        }
    }

    fn workflow(nodes: Vec<NodeDefinition>, edges: Vec<(&str, &str)>) -> Workflow {
        let id = Uuid::now_v7();
        Workflow {
            id,
            workspace_id: Uuid::now_v7(),
            name: "test".to_string(),
            nodes,
            edges: edges
                .into_iter()
                .map(|(from, to)| Edge {
                    workflow_id: id,
                    from_node_id: from.to_string(),
                    to_node_id: to.to_string(),
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn success(execution_id: Uuid, node_id: &str) -> NodeResult {
        NodeResult {
            execution_id,
            node_id: node_id.to_string(),
            status: NodeRunStatus::Success,
            result_data: json!({"ok": true}),
            duration_ms: Some(5),
            peak_memory_bytes: None,
            error: None,
            error_details: None,
            retry_count: 0,
        }
    }

    fn failure(execution_id: Uuid, node_id: &str) -> NodeResult {
        NodeResult {
            status: NodeRunStatus::Failed,
            error: Some("script exited 1".to_string()),
            ..success(execution_id, node_id)
        }
    }

    // -----------------------------------------------------------------------
    // start_execution
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_seeds_inputs_with_indegrees() {
        // a -> c, b -> c
        let wf = workflow(vec![node("a"), node("b"), node("c")], vec![("a", "c"), ("b", "c")]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);

        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);

        assert_eq!(backend.input_by_node(&execution.id, "a").dependency_count, 0);
        assert_eq!(backend.input_by_node(&execution.id, "b").dependency_count, 0);
        assert_eq!(backend.input_by_node(&execution.id, "c").dependency_count, 2);
    }

    #[tokio::test]
    async fn test_start_unknown_workflow() {
        let backend = MemoryBackend::default();
        let sched = scheduler(&backend);
        let err = sched
            .start_execution(&Uuid::now_v7(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn test_start_rejects_cyclic_workflow() {
        let wf = workflow(vec![node("a"), node("b")], vec![("a", "b"), ("b", "a")]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);

        let err = sched.start_execution(&wf_id, json!({})).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidGraph(_)));
    }

    // -----------------------------------------------------------------------
    // Dependency propagation through result ingestion
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_diamond_unblocks_stepwise() {
        let wf = workflow(vec![node("a"), node("b"), node("c")], vec![("a", "c"), ("b", "c")]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        // After a completes, c is still blocked.
        let ingestion = sched
            .process_execution_result(success(execution.id, "a"))
            .await
            .unwrap();
        assert_eq!(ingestion.terminal_status, None);
        assert_eq!(ingestion.dependents_updated, 1);
        assert_eq!(backend.input_by_node(&execution.id, "c").dependency_count, 1);

        // After b completes, c is ready.
        sched
            .process_execution_result(success(execution.id, "b"))
            .await
            .unwrap();
        assert_eq!(backend.input_by_node(&execution.id, "c").dependency_count, 0);
    }

    #[tokio::test]
    async fn test_decrement_clamped_at_zero() {
        let wf = workflow(vec![node("a"), node("b")], vec![("a", "b")]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        // Two decrements for the same completed predecessor: the second
        // finds dependency_count already 0 and touches nothing.
        let first = backend
            .decrement_dependencies(&execution.id, &["b".to_string()])
            .await
            .unwrap();
        let second = backend
            .decrement_dependencies(&execution.id, &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(backend.input_by_node(&execution.id, "b").dependency_count, 0);
    }

    #[tokio::test]
    async fn test_leaf_node_propagation_is_noop() {
        let wf = workflow(vec![node("a")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        let ingestion = sched
            .process_execution_result(success(execution.id, "a"))
            .await
            .unwrap();
        assert_eq!(ingestion.dependents_updated, 0);
    }

    // -----------------------------------------------------------------------
    // Ready batches
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_ready_batch_excludes_blocked_inputs() {
        let wf = workflow(vec![node("a"), node("b"), node("c")], vec![("a", "c"), ("b", "c")]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        sched.start_execution(&wf_id, json!({})).await.unwrap();

        let batch = sched.get_ready_execution_inputs(10).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|i| i.node_id.as_str()).collect();
        assert_eq!(batch.len(), 2);
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(batch.iter().all(|i| i.dependency_count == 0));
    }

    #[tokio::test]
    async fn test_dispatched_inputs_never_reappear() {
        let wf = workflow(vec![node("a"), node("b")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        sched.start_execution(&wf_id, json!({})).await.unwrap();

        let batch = sched.get_ready_execution_inputs(10).await.unwrap();
        let ids: Vec<Uuid> = batch.iter().map(|i| i.id).collect();
        let removed = sched
            .remove_processed_execution_inputs(&ids)
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let batch = sched.get_ready_execution_inputs(10).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_input_wait_factor_strictly_increases() {
        let mut high = node("high");
        high.priority = 10;
        let wf = workflow(vec![high, node("low")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        let mut last = backend.input_by_node(&execution.id, "low").wait_factor;
        for _ in 0..3 {
            let batch = sched.get_ready_execution_inputs(1).await.unwrap();
            assert_eq!(batch[0].node_id, "high");
            let current = backend.input_by_node(&execution.id, "low").wait_factor;
            assert_eq!(current, last + 1, "skipped input must age every round");
            last = current;
        }
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_completes_exactly_on_last_output() {
        let wf = workflow(vec![node("a"), node("b"), node("c")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        for node_id in ["a", "b"] {
            let ingestion = sched
                .process_execution_result(success(execution.id, node_id))
                .await
                .unwrap();
            assert_eq!(ingestion.terminal_status, None, "not terminal before Nth");
            assert_eq!(
                backend.execution(&execution.id).status,
                ExecutionStatus::Running
            );
        }

        let ingestion = sched
            .process_execution_result(success(execution.id, "c"))
            .await
            .unwrap();
        assert_eq!(ingestion.terminal_status, Some(ExecutionStatus::Completed));

        let finished = backend.execution(&execution.id);
        assert_eq!(finished.status, ExecutionStatus::Completed);
        assert!(finished.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_two_success_one_failed_is_failed() {
        let wf = workflow(vec![node("a"), node("b"), node("c")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        sched
            .process_execution_result(success(execution.id, "a"))
            .await
            .unwrap();
        sched
            .process_execution_result(success(execution.id, "b"))
            .await
            .unwrap();
        let ingestion = sched
            .process_execution_result(failure(execution.id, "c"))
            .await
            .unwrap();

        assert_eq!(ingestion.terminal_status, Some(ExecutionStatus::Failed));
        let finished = backend.execution(&execution.id);
        assert_eq!(finished.status, ExecutionStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("script exited 1"));
    }

    #[tokio::test]
    async fn test_fail_fast_terminates_immediately() {
        let wf = workflow(
            vec![node("a"), node("b"), node("c")],
            vec![("a", "b"), ("b", "c")],
        );
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        // First node fails: terminal with two nodes never run.
        let ingestion = sched
            .process_execution_result(failure(execution.id, "a"))
            .await
            .unwrap();
        assert_eq!(ingestion.terminal_status, Some(ExecutionStatus::Failed));
        assert_eq!(ingestion.dependents_updated, 0, "failed nodes don't unblock");

        // Remaining inputs were discarded; nothing is dispatchable.
        let batch = sched.get_ready_execution_inputs(10).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_result_rejected() {
        let wf = workflow(vec![node("a"), node("b")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        sched
            .process_execution_result(success(execution.id, "a"))
            .await
            .unwrap();
        let err = sched
            .process_execution_result(success(execution.id, "a"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Repository(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_result_for_unknown_execution() {
        let backend = MemoryBackend::default();
        let sched = scheduler(&backend);
        let err = sched
            .process_execution_result(success(Uuid::now_v7(), "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ExecutionNotFound(_)));
    }

    // -----------------------------------------------------------------------
    // Execution context
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_context_resolves_parameters() {
        let mut fetch = node("fetch");
        fetch.params = HashMap::from([
            ("limit".to_string(), ParamSpec::literal(json!(25))),
            (
                "branch".to_string(),
                ParamSpec::typed("${trigger:event.branch}", "string"),
            ),
            (
                "url".to_string(),
                ParamSpec::typed("${value:api_url}", "string"),
            ),
        ]);
        let wf = workflow(vec![fetch], vec![]);
        let wf_id = wf.id;
        let workspace_id = wf.workspace_id;
        let backend = MemoryBackend::with_workflow(wf);
        backend.state.lock().unwrap().variables.push(Variable {
            id: "api_url".to_string(),
            workspace_id,
            value: "https://api.example.com".to_string(),
            is_secret: false,
        });
        let sched = scheduler(&backend);

        let execution = sched
            .start_execution(&wf_id, json!({"event": {"branch": "main"}}))
            .await
            .unwrap();
        let input = backend.input_by_node(&execution.id, "fetch");

        let ctx = sched.create_execution_context(&input.id).await.unwrap();
        assert_eq!(ctx.execution_id, execution.id);
        assert_eq!(ctx.node_id, "fetch");
        assert_eq!(ctx.script_ref, "scripts/fetch.py");
        assert_eq!(ctx.max_retries, 3);
        assert_eq!(ctx.timeout_secs, 300);
        assert_eq!(ctx.params["limit"], json!(25));
        assert_eq!(ctx.params["branch"], json!("main"));
        assert_eq!(ctx.params["url"], json!("https://api.example.com"));
    }

    #[tokio::test]
    async fn test_create_context_resolution_error_aborts() {
        let mut summarize = node("summarize");
        summarize.params = HashMap::from([(
            "rows".to_string(),
            ParamSpec::typed("${node:fetch.rows}", "array"),
        )]);
        let wf = workflow(vec![summarize], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);

        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();
        let input = backend.input_by_node(&execution.id, "summarize");

        // No output for "fetch" exists: the whole context fails.
        let err = sched.create_execution_context(&input.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Resolution(_)));
    }

    #[tokio::test]
    async fn test_create_context_for_dispatched_input_fails() {
        let wf = workflow(vec![node("a")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();
        let input = backend.input_by_node(&execution.id, "a");

        sched
            .remove_processed_execution_inputs(&[input.id])
            .await
            .unwrap();
        let err = sched.create_execution_context(&input.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InputNotFound(_)));
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancel_running_execution() {
        let wf = workflow(vec![node("a"), node("b")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        sched.cancel_execution(&execution.id).await.unwrap();
        assert_eq!(
            backend.execution(&execution.id).status,
            ExecutionStatus::Cancelled
        );
        assert!(sched.get_ready_execution_inputs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_finished_execution_rejected() {
        let wf = workflow(vec![node("a")], vec![]);
        let wf_id = wf.id;
        let backend = MemoryBackend::with_workflow(wf);
        let sched = scheduler(&backend);
        let execution = sched.start_execution(&wf_id, json!({})).await.unwrap();

        sched
            .process_execution_result(success(execution.id, "a"))
            .await
            .unwrap();
        let err = sched.cancel_execution(&execution.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyFinished(_)));
    }
}
