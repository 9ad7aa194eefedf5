use super::error_response;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Map, Value};
use skein_core::error::SkeinError;
use skein_core::value::Value as TypedValue;
use skein_store::SuspensionRecord;
use uuid::Uuid;

/// GET /executions
pub async fn list_executions(State(state): State<AppState>) -> Json<Value> {
    let records = state.registry.list_executions();
    let list: Vec<Value> = records.iter().map(summary).collect();
    Json(json!({"list": list, "total": list.len()}))
}

/// GET /executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    match state.registry.get_execution(&id) {
        Ok(record) => (StatusCode::OK, Json(detail(&record))),
        Err(e) => error_response(&e),
    }
}

/// POST /executions/{id}/resume
pub async fn resume_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    let additional = match optional_object(&body, "additionalInputs") {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };
    let resolved = match optional_object(&body, "resolvedNodes") {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };

    match state
        .registry
        .resume(&id, additional.as_ref(), resolved.as_ref())
    {
        Ok(outcome) => super::execute::outcome_response(&outcome),
        Err(e) => error_response(&e),
    }
}

/// DELETE /executions/{id}
pub async fn delete_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    match state.registry.delete_execution(&id) {
        Ok(true) => (StatusCode::OK, Json(json!({"success": true, "deleted": true}))),
        Ok(false) => error_response(&SkeinError::NotFound(format!("execution {id}"))),
        Err(e) => error_response(&e),
    }
}

fn parse_id(raw: &str) -> Result<Uuid, SkeinError> {
    raw.parse()
        .map_err(|_| SkeinError::InvalidInput(format!("`{raw}` is not an execution id")))
}

fn optional_object(body: &Value, field: &str) -> Result<Option<Map<String, Value>>, SkeinError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(SkeinError::InvalidInput(format!(
            "`{field}` must be an object"
        ))),
    }
}

fn summary(record: &SuspensionRecord) -> Value {
    json!({
        "executionId": record.execution_id,
        "structuralHash": record.structural_hash,
        "createdAt": record.created_at,
        "lastTouchedAt": record.last_touched_at,
        "resumptionCount": record.resumption_count,
        "missingInputs": record.missing_inputs,
        "pendingOutputs": record.pending_outputs,
    })
}

fn detail(record: &SuspensionRecord) -> Value {
    let provided: Map<String, Value> = record
        .provided_inputs
        .iter()
        .map(|(name, value)| (name.clone(), TypedValue::to_json(value)))
        .collect();
    let mut body = summary(record);
    body["providedInputs"] = Value::Object(provided);
    body["resolvedNodeCount"] = json!(record.resolved_nodes.len());
    body
}
