use super::error_response;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};
use skein_core::error::SkeinError;

/// GET /pipelines/{name}/canary
pub async fn get_canary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.canary_state(&name) {
        Some(canary) => (StatusCode::OK, Json(json!({"success": true, "canary": canary}))),
        None => error_response(&SkeinError::NotFound(format!("no canary for `{name}`"))),
    }
}

/// POST /pipelines/{name}/canary/promote
pub async fn promote_canary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.promote_canary(&name) {
        Ok(canary) => (StatusCode::OK, Json(json!({"success": true, "canary": canary}))),
        Err(e) => error_response(&e),
    }
}

/// POST /pipelines/{name}/canary/rollback
pub async fn rollback_canary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.rollback_canary(&name) {
        Ok(canary) => (StatusCode::OK, Json(json!({"success": true, "canary": canary}))),
        Err(e) => error_response(&e),
    }
}

/// DELETE /pipelines/{name}/canary
pub async fn delete_canary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.delete_canary(&name) {
        Ok(canary) => (
            StatusCode::OK,
            Json(json!({"success": true, "deleted": true, "canary": canary})),
        ),
        Err(e) => error_response(&e),
    }
}
