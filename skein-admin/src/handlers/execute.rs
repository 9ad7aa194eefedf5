use super::{error_response, first_str, require_str};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Map, Value};
use skein_core::error::SkeinError;
use skein_runtime::ExecutionOutcome;

/// POST /execute
pub async fn execute(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(ref_str) = first_str(&body, &["ref", "dagName"]) else {
        return error_response(&SkeinError::InvalidInput(
            "missing required field `ref`".into(),
        ));
    };
    let inputs = match inputs_object(&body) {
        Ok(inputs) => inputs,
        Err(e) => return error_response(&e),
    };
    let strict = body.get("strict").and_then(Value::as_bool).unwrap_or(false);

    match state.registry.execute(ref_str, &inputs, strict) {
        Ok(outcome) => outcome_response(&outcome),
        Err(e) => error_response(&e),
    }
}

/// POST /run
pub async fn run(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let source = match require_str(&body, "source") {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    let inputs = match inputs_object(&body) {
        Ok(inputs) => inputs,
        Err(e) => return error_response(&e),
    };
    let strict = body.get("strict").and_then(Value::as_bool).unwrap_or(false);

    match state.registry.run(source, &inputs, strict) {
        Ok(outcome) => outcome_response(&outcome),
        Err(e) => error_response(&e),
    }
}

fn inputs_object(body: &Value) -> Result<Map<String, Value>, SkeinError> {
    match body.get("inputs") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(SkeinError::InvalidInput("`inputs` must be an object".into())),
    }
}

/// Shared response shape for execute / run / resume. A suspension is a
/// first-class success, not a failure.
pub(crate) fn outcome_response(outcome: &ExecutionOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        ExecutionOutcome::Completed {
            structural_hash,
            execution_id,
            resumption_count,
            outputs,
        } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": "completed",
                "executionId": execution_id,
                "structuralHash": structural_hash,
                "outputs": outputs,
                "resumptionCount": resumption_count,
            })),
        ),
        ExecutionOutcome::Suspended {
            structural_hash,
            execution_id,
            resumption_count,
            missing_inputs,
            pending_outputs,
        } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": "suspended",
                "executionId": execution_id,
                "structuralHash": structural_hash,
                "missingInputs": missing_inputs,
                "pendingOutputs": pending_outputs,
                "resumptionCount": resumption_count,
            })),
        ),
    }
}
