//! SQLite scheduler store.
//!
//! Implements `SchedulerStore` and `ExecutionLifecycle` from `runlet-core`
//! using sqlx with split read/write pools. Workflow definitions are stored
//! as JSON blobs with their edges mirrored into an indexed table; the
//! composite operations (ready-batch claim, dependency decrement, output
//! insert + count) each run inside one writer transaction, with the
//! decision logic delegated to the core policy functions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use runlet_core::repository::{ExecutionLifecycle, SchedulerStore};
use runlet_core::scheduler::readiness;
use runlet_types::error::RepositoryError;
use runlet_types::execution::{
    Execution, ExecutionInput, ExecutionOutput, ExecutionStatus, InputState, NodeRunStatus,
};
use runlet_types::workflow::{Edge, ParamSpec, Workflow};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of the scheduler ports.
#[derive(Clone)]
pub struct SqliteSchedulerStore {
    pub(crate) pool: DatabasePool,
}

impl SqliteSchedulerStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Upsert a workflow definition and mirror its edges into the indexed
    /// edge table, in one transaction.
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let definition = serde_json::to_string(workflow)
            .map_err(|e| RepositoryError::Query(format!("serialize workflow: {e}")))?;

        let mut tx = begin(&self.pool).await?;

        sqlx::query(
            r#"INSERT INTO workflows (id, workspace_id, name, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 workspace_id = excluded.workspace_id,
                 name = excluded.name,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(workflow.id.to_string())
        .bind(workflow.workspace_id.to_string())
        .bind(&workflow.name)
        .bind(&definition)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query("DELETE FROM workflow_edges WHERE workflow_id = ?")
            .bind(workflow.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        for edge in &workflow.edges {
            sqlx::query(
                r#"INSERT OR IGNORE INTO workflow_edges (workflow_id, from_node_id, to_node_id)
                   VALUES (?, ?, ?)"#,
            )
            .bind(edge.workflow_id.to_string())
            .bind(&edge.from_node_id)
            .bind(&edge.to_node_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

async fn begin(
    pool: &DatabasePool,
) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>, RepositoryError> {
    pool.writer.begin().await.map_err(query_err)
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Serialize a unit enum (snake_case serde rename) to its tag string.
fn enum_to_str<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    match serde_json::to_value(value).map_err(|e| RepositoryError::Query(e.to_string()))? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(RepositoryError::Query(format!(
            "expected string tag, got {other}"
        ))),
    }
}

/// Parse a unit enum from its tag string.
fn enum_from_str<T: serde::de::DeserializeOwned>(
    s: &str,
    what: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid {what}: {s}")))
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    workflow_id: String,
    workspace_id: String,
    status: String,
    trigger_payload: String,
    started_at: String,
    ended_at: Option<String>,
    retry_count: i64,
    max_retries: i64,
    is_retry: bool,
    parent_execution_id: Option<String>,
    error: Option<String>,
    error_details: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            workspace_id: row.try_get("workspace_id")?,
            status: row.try_get("status")?,
            trigger_payload: row.try_get("trigger_payload")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            is_retry: row.try_get("is_retry")?,
            parent_execution_id: row.try_get("parent_execution_id")?,
            error: row.try_get("error")?,
            error_details: row.try_get("error_details")?,
        })
    }

    fn into_execution(self) -> Result<Execution, RepositoryError> {
        let trigger_payload = serde_json::from_str(&self.trigger_payload)
            .map_err(|e| RepositoryError::Query(format!("invalid trigger_payload: {e}")))?;
        let error_details = self
            .error_details
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid error_details: {e}")))
            })
            .transpose()?;

        Ok(Execution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workspace_id: parse_uuid(&self.workspace_id)?,
            status: enum_from_str::<ExecutionStatus>(&self.status, "execution status")?,
            trigger_payload,
            started_at: parse_datetime(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_datetime).transpose()?,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            is_retry: self.is_retry,
            parent_execution_id: self
                .parent_execution_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?,
            error: self.error,
            error_details,
        })
    }
}

struct InputRow {
    id: String,
    execution_id: String,
    node_id: String,
    workspace_id: String,
    script_ref: String,
    params: String,
    dependency_count: i64,
    priority: i64,
    wait_factor: i64,
    retry_count: i64,
    max_retries: i64,
    timeout_secs: i64,
    state: String,
    dispatched_at: Option<String>,
}

impl InputRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            node_id: row.try_get("node_id")?,
            workspace_id: row.try_get("workspace_id")?,
            script_ref: row.try_get("script_ref")?,
            params: row.try_get("params")?,
            dependency_count: row.try_get("dependency_count")?,
            priority: row.try_get("priority")?,
            wait_factor: row.try_get("wait_factor")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            timeout_secs: row.try_get("timeout_secs")?,
            state: row.try_get("state")?,
            dispatched_at: row.try_get("dispatched_at")?,
        })
    }

    fn into_input(self) -> Result<ExecutionInput, RepositoryError> {
        let params: HashMap<String, ParamSpec> = serde_json::from_str(&self.params)
            .map_err(|e| RepositoryError::Query(format!("invalid params JSON: {e}")))?;

        Ok(ExecutionInput {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            node_id: self.node_id,
            workspace_id: parse_uuid(&self.workspace_id)?,
            script_ref: self.script_ref,
            params,
            dependency_count: self.dependency_count as u32,
            priority: self.priority as i32,
            wait_factor: self.wait_factor as u32,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            timeout_secs: self.timeout_secs as u64,
            state: enum_from_str::<InputState>(&self.state, "input state")?,
            dispatched_at: self
                .dispatched_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

struct OutputRow {
    id: String,
    execution_id: String,
    node_id: String,
    status: String,
    result_data: String,
    duration_ms: Option<i64>,
    peak_memory_bytes: Option<i64>,
    error: Option<String>,
    error_details: Option<String>,
    retry_count: i64,
    recorded_at: String,
}

impl OutputRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            node_id: row.try_get("node_id")?,
            status: row.try_get("status")?,
            result_data: row.try_get("result_data")?,
            duration_ms: row.try_get("duration_ms")?,
            peak_memory_bytes: row.try_get("peak_memory_bytes")?,
            error: row.try_get("error")?,
            error_details: row.try_get("error_details")?,
            retry_count: row.try_get("retry_count")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_output(self) -> Result<ExecutionOutput, RepositoryError> {
        let result_data = serde_json::from_str(&self.result_data)
            .map_err(|e| RepositoryError::Query(format!("invalid result_data: {e}")))?;
        let error_details = self
            .error_details
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid error_details: {e}")))
            })
            .transpose()?;

        Ok(ExecutionOutput {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            node_id: self.node_id,
            status: enum_from_str::<NodeRunStatus>(&self.status, "output status")?,
            result_data,
            duration_ms: self.duration_ms.map(|v| v as u64),
            peak_memory_bytes: self.peak_memory_bytes.map(|v| v as u64),
            error: self.error,
            error_details,
            retry_count: self.retry_count as u32,
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// SchedulerStore impl
// ---------------------------------------------------------------------------

impl SchedulerStore for SqliteSchedulerStore {
    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let definition: String = row.try_get("definition").map_err(query_err)?;
                let workflow = serde_json::from_str(&definition).map_err(|e| {
                    RepositoryError::Query(format!("invalid workflow definition JSON: {e}"))
                })?;
                Ok(Some(workflow))
            }
            None => Ok(None),
        }
    }

    async fn edges_from(
        &self,
        workflow_id: &Uuid,
        from_node_id: &str,
    ) -> Result<Vec<Edge>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT workflow_id, from_node_id, to_node_id FROM workflow_edges
             WHERE workflow_id = ? AND from_node_id = ?",
        )
        .bind(workflow_id.to_string())
        .bind(from_node_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in &rows {
            let workflow_id: String = row.try_get("workflow_id").map_err(query_err)?;
            edges.push(Edge {
                workflow_id: parse_uuid(&workflow_id)?,
                from_node_id: row.try_get("from_node_id").map_err(query_err)?,
                to_node_id: row.try_get("to_node_id").map_err(query_err)?,
            });
        }
        Ok(edges)
    }

    async fn insert_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let trigger_payload = serde_json::to_string(&execution.trigger_payload)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let error_details = execution
            .error_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO executions
               (id, workflow_id, workspace_id, status, trigger_payload, started_at, ended_at,
                retry_count, max_retries, is_retry, parent_execution_id, error, error_details)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.workspace_id.to_string())
        .bind(enum_to_str(&execution.status)?)
        .bind(&trigger_payload)
        .bind(format_datetime(&execution.started_at))
        .bind(execution.ended_at.as_ref().map(format_datetime))
        .bind(execution.retry_count as i64)
        .bind(execution.max_retries as i64)
        .bind(execution.is_retry)
        .bind(execution.parent_execution_id.map(|id| id.to_string()))
        .bind(&execution.error)
        .bind(&error_details)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn insert_inputs(&self, inputs: &[ExecutionInput]) -> Result<(), RepositoryError> {
        let mut tx = begin(&self.pool).await?;

        for input in inputs {
            let params = serde_json::to_string(&input.params)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            sqlx::query(
                r#"INSERT INTO execution_inputs
                   (id, execution_id, node_id, workspace_id, script_ref, params,
                    dependency_count, priority, wait_factor, retry_count, max_retries,
                    timeout_secs, state, dispatched_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(input.id.to_string())
            .bind(input.execution_id.to_string())
            .bind(&input.node_id)
            .bind(input.workspace_id.to_string())
            .bind(&input.script_ref)
            .bind(&params)
            .bind(input.dependency_count as i64)
            .bind(input.priority as i64)
            .bind(input.wait_factor as i64)
            .bind(input.retry_count as i64)
            .bind(input.max_retries as i64)
            .bind(input.timeout_secs as i64)
            .bind(enum_to_str(&input.state)?)
            .bind(input.dispatched_at.as_ref().map(format_datetime))
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_input(
        &self,
        id: &Uuid,
        include_dispatched: bool,
    ) -> Result<Option<ExecutionInput>, RepositoryError> {
        let sql = if include_dispatched {
            "SELECT * FROM execution_inputs WHERE id = ?"
        } else {
            "SELECT * FROM execution_inputs WHERE id = ? AND state = 'pending'"
        };

        let row = sqlx::query(sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = InputRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_input()?))
            }
            None => Ok(None),
        }
    }

    async fn claim_ready_batch(
        &self,
        batch_size: usize,
    ) -> Result<Vec<ExecutionInput>, RepositoryError> {
        // Snapshot, decide, and age inside one writer transaction so the
        // selection and the wait-factor increments land together.
        let mut tx = begin(&self.pool).await?;

        let rows = sqlx::query("SELECT * FROM execution_inputs WHERE state = 'pending'")
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err)?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = InputRow::from_row(row).map_err(query_err)?;
            pending.push(r.into_input()?);
        }

        let selection = readiness::select_batch(pending, batch_size);

        for id in &selection.aged {
            sqlx::query("UPDATE execution_inputs SET wait_factor = wait_factor + 1 WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(selection.selected)
    }

    async fn decrement_dependencies(
        &self,
        execution_id: &Uuid,
        target_node_ids: &[String],
    ) -> Result<u64, RepositoryError> {
        if target_node_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; target_node_ids.len()].join(", ");
        let sql = format!(
            "UPDATE execution_inputs
             SET dependency_count = dependency_count - 1
             WHERE execution_id = ? AND state = 'pending'
               AND dependency_count > 0 AND node_id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(execution_id.to_string());
        for node_id in target_node_ids {
            query = query.bind(node_id);
        }

        let result = query.execute(&self.pool.writer).await.map_err(query_err)?;
        Ok(result.rows_affected())
    }

    async fn mark_inputs_dispatched(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE execution_inputs
             SET state = 'dispatched', dispatched_at = ?
             WHERE state = 'pending' AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(format_datetime(&Utc::now()));
        for id in ids {
            query = query.bind(id.to_string());
        }

        let result = query.execute(&self.pool.writer).await.map_err(query_err)?;
        Ok(result.rows_affected())
    }

    async fn discard_inputs_for_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE execution_inputs
             SET state = 'dispatched', dispatched_at = ?
             WHERE state = 'pending' AND execution_id = ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected())
    }

    async fn insert_output(&self, output: &ExecutionOutput) -> Result<u64, RepositoryError> {
        let result_data = serde_json::to_string(&output.result_data)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let error_details = output
            .error_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Insert and count in the same transaction so the returned count
        // is consistent with this output having landed.
        let mut tx = begin(&self.pool).await?;

        let inserted = sqlx::query(
            r#"INSERT INTO execution_outputs
               (id, execution_id, node_id, status, result_data, duration_ms,
                peak_memory_bytes, error, error_details, retry_count, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(output.id.to_string())
        .bind(output.execution_id.to_string())
        .bind(&output.node_id)
        .bind(enum_to_str(&output.status)?)
        .bind(&result_data)
        .bind(output.duration_ms.map(|v| v as i64))
        .bind(output.peak_memory_bytes.map(|v| v as i64))
        .bind(&output.error)
        .bind(&error_details)
        .bind(output.retry_count as i64)
        .bind(format_datetime(&output.recorded_at))
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let unique_violation = e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false);
            return Err(if unique_violation {
                RepositoryError::Conflict(format!(
                    "output already recorded for node '{}'",
                    output.node_id
                ))
            } else {
                query_err(e)
            });
        }

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM execution_outputs WHERE execution_id = ?")
                .bind(output.execution_id.to_string())
                .fetch_one(&mut *tx)
                .await
                .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(count.0 as u64)
    }

    async fn outputs_for_execution(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ExecutionOutput>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM execution_outputs WHERE execution_id = ? ORDER BY recorded_at ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut outputs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = OutputRow::from_row(row).map_err(query_err)?;
            outputs.push(r.into_output()?);
        }
        Ok(outputs)
    }
}

// ---------------------------------------------------------------------------
// ExecutionLifecycle impl
// ---------------------------------------------------------------------------

impl ExecutionLifecycle for SqliteSchedulerStore {
    async fn end_execution(
        &self,
        execution_id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        // Only a running execution transitions: a second caller racing on
        // the completion check degrades to a no-op here.
        let result = sqlx::query(
            "UPDATE executions SET status = ?, ended_at = ?, error = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(enum_to_str(&status)?)
        .bind(format_datetime(&Utc::now()))
        .bind(error)
        .bind(execution_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            tracing::debug!(%execution_id, ?status, "end_execution no-op (not running)");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
