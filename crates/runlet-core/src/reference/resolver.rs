//! Batched reference resolution for one node invocation.
//!
//! A single pass groups the invocation's parameter map into per-kind
//! buckets (literals merge straight into the output); each bucket then
//! resolves with one batch lookup over its distinct referenced ids, so a
//! node referencing the same variable or output many times costs one
//! round-trip per kind. Any failure aborts the whole resolution -- the
//! scheduler never dispatches a partial parameter set.

use std::collections::HashMap;

use runlet_types::error::ResolutionError;
use runlet_types::execution::{Execution, ExecutionInput, ExecutionOutput};
use runlet_types::reference::ReferenceKind;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::repository::{ResourceStore, SchedulerStore, SecretCipher, WorkspaceFiles};

use super::coerce::coerce_declared;
use super::parser;
use super::path::resolve_path;

/// The default file path segment: read the file's content as UTF-8 text.
const FILE_CONTENT_PATH: &str = "content";

/// Prefix selecting a file model attribute instead of content.
const FILE_METADATA_PREFIX: &str = "metadata.";

// ---------------------------------------------------------------------------
// Pending references
// ---------------------------------------------------------------------------

/// One reference awaiting resolution, with its parameter context.
#[derive(Debug, Clone)]
struct PendingRef {
    param: String,
    id: Option<String>,
    path: Option<String>,
    expected_type: Option<String>,
}

impl PendingRef {
    /// The referenced entity id. Parsing guarantees an id for every kind
    /// this is called on (everything but `trigger`).
    fn entity_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Apply this reference's path (if any) to a resolved base value.
    fn apply_path(&self, base: &Value) -> Result<Value, ResolutionError> {
        match self.path.as_deref() {
            Some(p) => resolve_path(base, p)
                .map(Value::clone)
                .map_err(|source| ResolutionError::Path {
                    param: self.param.clone(),
                    path: p.to_string(),
                    source,
                }),
            None => Ok(base.clone()),
        }
    }
}

/// Per-kind buckets filled by the grouping pass. A closed struct rather
/// than a map keyed by tag, so a new reference kind is a compile error
/// until every resolution site handles it.
#[derive(Debug, Default)]
struct KindBuckets {
    statics: Vec<PendingRef>,
    triggers: Vec<PendingRef>,
    nodes: Vec<PendingRef>,
    values: Vec<PendingRef>,
    credentials: Vec<PendingRef>,
    databases: Vec<PendingRef>,
    files: Vec<PendingRef>,
}

/// Distinct entity ids across a bucket, in first-seen order.
fn distinct_ids(refs: &[PendingRef]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    refs.iter()
        .map(|r| r.entity_id().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// ParameterResolver
// ---------------------------------------------------------------------------

/// Resolves a node invocation's parameter map against the stores.
pub struct ParameterResolver<'a, S, C, W>
where
    S: SchedulerStore + ResourceStore,
    C: SecretCipher,
    W: WorkspaceFiles,
{
    store: &'a S,
    cipher: &'a C,
    files: &'a W,
}

impl<'a, S, C, W> ParameterResolver<'a, S, C, W>
where
    S: SchedulerStore + ResourceStore,
    C: SecretCipher,
    W: WorkspaceFiles,
{
    pub fn new(store: &'a S, cipher: &'a C, files: &'a W) -> Self {
        Self {
            store,
            cipher,
            files,
        }
    }

    /// Resolve every parameter of `input` to a flat `{name: value}` map.
    pub async fn resolve(
        &self,
        input: &ExecutionInput,
        execution: &Execution,
    ) -> Result<Map<String, Value>, ResolutionError> {
        let mut resolved = Map::new();
        let mut buckets = KindBuckets::default();

        // One grouping pass: references into buckets, literals straight
        // through unchanged.
        for (name, spec) in &input.params {
            match &spec.value {
                Value::String(s) if parser::is_reference(s) => {
                    let parsed = parser::parse(s)?;
                    let pending = PendingRef {
                        param: name.clone(),
                        id: parsed.id,
                        path: parsed.path,
                        expected_type: spec.expected_type.clone(),
                    };
                    match parsed.kind {
                        ReferenceKind::Static => buckets.statics.push(pending),
                        ReferenceKind::Trigger => buckets.triggers.push(pending),
                        ReferenceKind::Node => buckets.nodes.push(pending),
                        ReferenceKind::Value => buckets.values.push(pending),
                        ReferenceKind::Credential => buckets.credentials.push(pending),
                        ReferenceKind::Database => buckets.databases.push(pending),
                        ReferenceKind::File => buckets.files.push(pending),
                    }
                }
                literal => {
                    resolved.insert(name.clone(), literal.clone());
                }
            }
        }

        self.resolve_statics(buckets.statics, &mut resolved)?;
        self.resolve_triggers(buckets.triggers, execution, &mut resolved)?;
        self.resolve_nodes(buckets.nodes, &execution.id, &mut resolved)
            .await?;
        self.resolve_values(buckets.values, &input.workspace_id, &mut resolved)
            .await?;
        self.resolve_credentials(buckets.credentials, &input.workspace_id, &mut resolved)
            .await?;
        self.resolve_databases(buckets.databases, &input.workspace_id, &mut resolved)
            .await?;
        self.resolve_files(buckets.files, &input.workspace_id, &mut resolved)
            .await?;

        Ok(resolved)
    }

    // -----------------------------------------------------------------------
    // static
    // -----------------------------------------------------------------------

    fn resolve_statics(
        &self,
        refs: Vec<PendingRef>,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        for r in refs {
            let literal = Value::String(r.entity_id().to_string());
            let value = coerce_declared(literal, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // trigger
    // -----------------------------------------------------------------------

    fn resolve_triggers(
        &self,
        refs: Vec<PendingRef>,
        execution: &Execution,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        // The trigger payload is loaded with the execution, so every
        // trigger reference in this pass reads the same snapshot.
        for r in refs {
            let value = r.apply_path(&execution.trigger_payload)?;
            let value = coerce_declared(value, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // node
    // -----------------------------------------------------------------------

    async fn resolve_nodes(
        &self,
        refs: Vec<PendingRef>,
        execution_id: &Uuid,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        if refs.is_empty() {
            return Ok(());
        }

        // One batch fetch for every node reference in the invocation.
        let outputs = self.store.outputs_for_execution(execution_id).await?;
        let by_node: HashMap<&str, &ExecutionOutput> =
            outputs.iter().map(|o| (o.node_id.as_str(), o)).collect();

        for r in refs {
            let output = by_node
                .get(r.entity_id())
                .ok_or_else(|| ResolutionError::NotFound {
                    entity: "node output",
                    id: r.entity_id().to_string(),
                })?;
            let value = r.apply_path(&output.result_data)?;
            let value = coerce_declared(value, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // value (workspace variables)
    // -----------------------------------------------------------------------

    async fn resolve_values(
        &self,
        refs: Vec<PendingRef>,
        workspace_id: &Uuid,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        if refs.is_empty() {
            return Ok(());
        }

        let variables = self.store.variables_by_ids(&distinct_ids(&refs)).await?;
        let by_id: HashMap<&str, _> = variables.iter().map(|v| (v.id.as_str(), v)).collect();

        for r in refs {
            let var = by_id
                .get(r.entity_id())
                .ok_or_else(|| ResolutionError::NotFound {
                    entity: "variable",
                    id: r.entity_id().to_string(),
                })?;
            if var.workspace_id != *workspace_id {
                return Err(ResolutionError::CrossTenant {
                    entity: "variable",
                    id: var.id.clone(),
                });
            }

            let plain = if var.is_secret {
                self.cipher.decrypt(&var.value)?
            } else {
                var.value.clone()
            };

            // Opportunistically parse JSON-encoded values so paths can
            // reach inside them; anything that isn't JSON stays a string.
            let base = match serde_json::from_str::<Value>(&plain) {
                Ok(parsed) => parsed,
                Err(_) => Value::String(plain),
            };

            let value = r.apply_path(&base)?;
            let value = coerce_declared(value, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // credential
    // -----------------------------------------------------------------------

    async fn resolve_credentials(
        &self,
        refs: Vec<PendingRef>,
        workspace_id: &Uuid,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        if refs.is_empty() {
            return Ok(());
        }

        let credentials = self.store.credentials_by_ids(&distinct_ids(&refs)).await?;
        let by_id: HashMap<&str, _> = credentials.iter().map(|c| (c.id.as_str(), c)).collect();

        for r in refs {
            let cred = by_id
                .get(r.entity_id())
                .ok_or_else(|| ResolutionError::NotFound {
                    entity: "credential",
                    id: r.entity_id().to_string(),
                })?;
            if cred.workspace_id != *workspace_id {
                return Err(ResolutionError::CrossTenant {
                    entity: "credential",
                    id: cred.id.clone(),
                });
            }

            let plain = self.cipher.decrypt(&cred.ciphertext)?;
            let base = match serde_json::from_str::<Value>(&plain) {
                Ok(parsed) => parsed,
                Err(_) => Value::String(plain),
            };

            // Path and coercion are both optional here: with neither, the
            // raw decrypted structure flows through untouched (credentials
            // are often consumed as opaque blobs).
            let value = r.apply_path(&base)?;
            let value = coerce_declared(value, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // database
    // -----------------------------------------------------------------------

    async fn resolve_databases(
        &self,
        refs: Vec<PendingRef>,
        workspace_id: &Uuid,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        if refs.is_empty() {
            return Ok(());
        }

        let databases = self.store.databases_by_ids(&distinct_ids(&refs)).await?;
        let by_id: HashMap<&str, _> = databases.iter().map(|d| (d.id.as_str(), d)).collect();

        for r in refs {
            let db = by_id
                .get(r.entity_id())
                .ok_or_else(|| ResolutionError::NotFound {
                    entity: "database",
                    id: r.entity_id().to_string(),
                })?;
            if db.workspace_id != *workspace_id {
                return Err(ResolutionError::CrossTenant {
                    entity: "database",
                    id: db.id.clone(),
                });
            }

            // Only the connection projection is ever exposed.
            let value = r.apply_path(&db.summary())?;
            let value = coerce_declared(value, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // file
    // -----------------------------------------------------------------------

    async fn resolve_files(
        &self,
        refs: Vec<PendingRef>,
        workspace_id: &Uuid,
        out: &mut Map<String, Value>,
    ) -> Result<(), ResolutionError> {
        if refs.is_empty() {
            return Ok(());
        }

        let files = self.store.files_by_ids(&distinct_ids(&refs)).await?;
        let by_id: HashMap<&str, _> = files.iter().map(|f| (f.id.as_str(), f)).collect();

        for r in refs {
            let file = by_id
                .get(r.entity_id())
                .ok_or_else(|| ResolutionError::NotFound {
                    entity: "file",
                    id: r.entity_id().to_string(),
                })?;
            if file.workspace_id != *workspace_id {
                return Err(ResolutionError::CrossTenant {
                    entity: "file",
                    id: file.id.clone(),
                });
            }

            let value = match r.path.as_deref() {
                // Default: the file's content as UTF-8 text.
                None | Some(FILE_CONTENT_PATH) => {
                    let bytes = self.files.read(workspace_id, &file.relative_path).await?;
                    let text =
                        String::from_utf8(bytes).map_err(|_| ResolutionError::NonUtf8File {
                            id: file.id.clone(),
                        })?;
                    Value::String(text)
                }
                // `metadata.<attr>` and bare `<attr>` both read model
                // attributes; a missing attribute fails loudly.
                Some(p) => {
                    let attr_path = p.strip_prefix(FILE_METADATA_PREFIX).unwrap_or(p);
                    let model = serde_json::to_value(file).map_err(|e| {
                        ResolutionError::InvalidReference(format!(
                            "file '{}' metadata not representable: {e}",
                            file.id
                        ))
                    })?;
                    resolve_path(&model, attr_path)
                        .map(Value::clone)
                        .map_err(|source| ResolutionError::Path {
                            param: r.param.clone(),
                            path: p.to_string(),
                            source,
                        })?
                }
            };

            let value = coerce_declared(value, r.expected_type.as_deref(), &r.param)?;
            out.insert(r.param, value);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
