//! The execution façade: JSON inputs in, classified outcomes out.
//!
//! Execution is lenient by default: missing inputs suspend the run into
//! a durable record instead of failing. Alias-routed executions feed
//! the canary router; engine failures are classified and never cross
//! this boundary as panics.

use crate::registry::Registry;
use chrono::Utc;
use serde_json::{Map as JsonMap, Value as JsonValue};
use skein_core::error::SkeinError;
use skein_core::image::PipelineImage;
use skein_core::types::TypeDescriptor;
use skein_core::value::Value;
use skein_engine::EngineResult;
use skein_store::SuspensionRecord;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// A finished or parked execution, as reported to clients.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed {
        structural_hash: String,
        execution_id: Uuid,
        resumption_count: u32,
        outputs: BTreeMap<String, JsonValue>,
    },
    Suspended {
        structural_hash: String,
        execution_id: Uuid,
        resumption_count: u32,
        missing_inputs: BTreeMap<String, TypeDescriptor>,
        pending_outputs: Vec<String>,
    },
}

impl Registry {
    /// Execute the pipeline identified by `ref_str` against JSON inputs.
    /// With `strict`, a run that cannot complete fails with
    /// `InputMissing` instead of suspending.
    pub fn execute(
        &self,
        ref_str: &str,
        inputs: &JsonMap<String, JsonValue>,
        strict: bool,
    ) -> Result<ExecutionOutcome, SkeinError> {
        let (image, canary_name) = self.resolve_for_execution(ref_str)?;
        let provided = convert_inputs(&image, inputs)?;

        let started = Instant::now();
        let result = skein_engine::evaluate(&image, &provided, &HashMap::new());
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Some(name) = &canary_name {
            self.record_canary_result(name, &image.structural_hash, result.is_ok(), latency_ms);
        }

        let result = result.map_err(|e| SkeinError::EngineError(e.to_string()))?;
        self.classify(&image, provided, result, None, strict)
    }

    /// Compile, store, then execute (`POST /run`).
    pub fn run(
        &self,
        source: &str,
        inputs: &JsonMap<String, JsonValue>,
        strict: bool,
    ) -> Result<ExecutionOutcome, SkeinError> {
        let summary = self.compile_and_store(source, None)?;
        self.execute(&summary.structural_hash, inputs, strict)
    }

    /// Resume a suspended execution with additional inputs and/or
    /// externally resolved node values.
    pub fn resume(
        &self,
        execution_id: &Uuid,
        additional_inputs: Option<&JsonMap<String, JsonValue>>,
        resolved_nodes: Option<&JsonMap<String, JsonValue>>,
    ) -> Result<ExecutionOutcome, SkeinError> {
        let record = self
            .suspensions()
            .get(execution_id)
            .ok_or_else(|| SkeinError::NotFound(format!("execution {execution_id}")))?;
        let image = self.pipelines().get(&record.structural_hash).ok_or_else(|| {
            SkeinError::NotFound(format!(
                "image {} for execution {execution_id}",
                record.structural_hash
            ))
        })?;

        // New values override old ones for the same name, re-checked
        // against the image's declared inputs.
        let mut provided = record.provided_inputs.clone();
        if let Some(extra) = additional_inputs {
            for (name, value) in convert_inputs(&image, extra)? {
                provided.insert(name, value);
            }
        }

        let mut carried = record.resolved_nodes.clone();
        if let Some(nodes) = resolved_nodes {
            for (key, json) in nodes {
                let id: u32 = key.parse().map_err(|_| {
                    SkeinError::InvalidInput(format!("resolvedNodes key `{key}` is not a node id"))
                })?;
                let node = image.graph.node(id).ok_or_else(|| {
                    SkeinError::InvalidInput(format!("node id {id} out of range"))
                })?;
                let value = Value::from_json(&node.ty, json)
                    .map_err(|e| SkeinError::InputTypeMismatch(format!("node {id}: {e}")))?;
                carried.insert(id, value);
            }
        }

        let result = skein_engine::evaluate(&image, &provided, &carried)
            .map_err(|e| SkeinError::EngineError(e.to_string()))?;
        self.classify(&image, provided, result, Some(record), false)
    }

    pub fn get_execution(&self, execution_id: &Uuid) -> Result<SuspensionRecord, SkeinError> {
        self.suspensions()
            .get(execution_id)
            .ok_or_else(|| SkeinError::NotFound(format!("execution {execution_id}")))
    }

    pub fn list_executions(&self) -> Vec<SuspensionRecord> {
        self.suspensions().list()
    }

    pub fn delete_execution(&self, execution_id: &Uuid) -> Result<bool, SkeinError> {
        self.suspensions().delete(execution_id)
    }

    /// Turn an engine result into the client-visible outcome, creating,
    /// updating, or deleting the suspension record as required.
    fn classify(
        &self,
        image: &PipelineImage,
        provided: BTreeMap<String, Value>,
        result: EngineResult,
        prior: Option<SuspensionRecord>,
        strict: bool,
    ) -> Result<ExecutionOutcome, SkeinError> {
        if result.is_complete() {
            let (execution_id, resumption_count) = match prior {
                Some(record) => {
                    self.suspensions().delete(&record.execution_id)?;
                    (record.execution_id, record.resumption_count + 1)
                }
                None => (Uuid::new_v4(), 0),
            };
            info!(
                hash = %image.structural_hash,
                execution_id = %execution_id,
                "execution completed"
            );
            return Ok(ExecutionOutcome::Completed {
                structural_hash: image.structural_hash.clone(),
                execution_id,
                resumption_count,
                outputs: result
                    .outputs
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            });
        }

        if strict {
            let names: Vec<&str> = result.missing_inputs.keys().map(String::as_str).collect();
            return Err(SkeinError::InputMissing(names.join(", ")));
        }

        let now = Utc::now();
        let record = match prior {
            Some(mut record) => {
                record.provided_inputs = provided;
                record.resolved_nodes = result.resolved_nodes;
                record.missing_inputs = result.missing_inputs;
                record.pending_outputs = result.pending_outputs;
                record.resumption_count += 1;
                record.last_touched_at = now;
                record
            }
            None => SuspensionRecord {
                execution_id: Uuid::new_v4(),
                structural_hash: image.structural_hash.clone(),
                created_at: now,
                last_touched_at: now,
                resumption_count: 0,
                provided_inputs: provided,
                resolved_nodes: result.resolved_nodes,
                missing_inputs: result.missing_inputs,
                pending_outputs: result.pending_outputs,
            },
        };

        debug!(
            hash = %image.structural_hash,
            execution_id = %record.execution_id,
            missing = record.missing_inputs.len(),
            "execution suspended"
        );
        let outcome = ExecutionOutcome::Suspended {
            structural_hash: record.structural_hash.clone(),
            execution_id: record.execution_id,
            resumption_count: record.resumption_count,
            missing_inputs: record.missing_inputs.clone(),
            pending_outputs: record.pending_outputs.clone(),
        };
        self.suspensions().upsert(record)?;
        Ok(outcome)
    }
}

/// Convert the JSON input map into typed values per the image's declared
/// inputs. Undeclared keys are ignored; declared-but-absent keys are
/// left out (lenient execution handles them).
fn convert_inputs(
    image: &PipelineImage,
    inputs: &JsonMap<String, JsonValue>,
) -> Result<BTreeMap<String, Value>, SkeinError> {
    let mut provided = BTreeMap::new();
    for (name, ty) in &image.declared_inputs {
        if let Some(json) = inputs.get(name) {
            let value = Value::from_json(ty, json)
                .map_err(|e| SkeinError::InputTypeMismatch(format!("input `{name}`: {e}")))?;
            provided.insert(name.clone(), value);
        }
    }
    Ok(provided)
}
