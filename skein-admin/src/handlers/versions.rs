use super::error_response;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};
use skein_core::canary::CanaryConfig;
use skein_core::error::SkeinError;
use skein_runtime::{ReloadOutcome, RollbackOutcome};

/// POST /pipelines/{name}/reload
pub async fn reload_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let source = body.get("source").and_then(Value::as_str);
    let canary = match body.get("canary") {
        None | Some(Value::Null) => None,
        Some(raw) => match serde_json::from_value::<CanaryConfig>(raw.clone()) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                return error_response(&SkeinError::InvalidInput(format!(
                    "bad canary config: {e}"
                )))
            }
        },
    };

    match state.registry.reload(&name, source, canary) {
        Ok(outcome) => (StatusCode::OK, Json(reload_body(&name, &outcome))),
        Err(e) => error_response(&e),
    }
}

/// GET /pipelines/{name}/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    let versions = state.registry.versions().list_versions(&name);
    if versions.is_empty() && state.registry.pipelines().resolve(&name).is_none() {
        return error_response(&SkeinError::NotFound(format!("pipeline `{name}`")));
    }
    let active = state.registry.versions().active_version(&name);
    (
        StatusCode::OK,
        Json(json!({
            "list": versions,
            "total": versions.len(),
            "active": active,
        })),
    )
}

/// POST /pipelines/{name}/rollback
pub async fn rollback_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.rollback(&name, None) {
        Ok(outcome) => (StatusCode::OK, Json(rollback_body(&name, &outcome))),
        Err(e) => error_response(&e),
    }
}

/// POST /pipelines/{name}/rollback/{v}
pub async fn rollback_pipeline_to(
    State(state): State<AppState>,
    Path((name, v)): Path<(String, u32)>,
) -> (StatusCode, Json<Value>) {
    match state.registry.rollback(&name, Some(v)) {
        Ok(outcome) => (StatusCode::OK, Json(rollback_body(&name, &outcome))),
        Err(e) => error_response(&e),
    }
}

fn reload_body(name: &str, outcome: &ReloadOutcome) -> Value {
    json!({
        "success": true,
        "name": name,
        "changed": outcome.changed,
        "previousHash": outcome.previous_hash,
        "newHash": outcome.new_hash,
        "version": outcome.version,
        "canary": outcome.canary,
    })
}

fn rollback_body(name: &str, outcome: &RollbackOutcome) -> Value {
    json!({
        "success": true,
        "name": name,
        "version": outcome.version,
        "structuralHash": outcome.structural_hash,
        "previousHash": outcome.previous_hash,
    })
}
