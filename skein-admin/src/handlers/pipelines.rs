use super::{error_response, require_str};
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};
use skein_core::error::SkeinError;
use skein_core::refs::PipelineRef;

/// GET /pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> Json<Value> {
    let images = state.registry.pipelines().list_images();
    Json(json!({"list": images, "total": images.len()}))
}

/// GET /pipelines/{ref}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(ref_str): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.resolve_image(&ref_str) {
        Ok(image) => {
            let aliases = state.registry.pipelines().aliases_for(&image.structural_hash);
            (
                StatusCode::OK,
                Json(json!({
                    "structuralHash": image.structural_hash,
                    "syntacticHash": image.syntactic_hash,
                    "compiledAt": image.compiled_at,
                    "declaredInputs": image.declared_inputs,
                    "declaredOutputs": image.declared_outputs,
                    "moduleCount": image.module_count,
                    "aliases": aliases,
                })),
            )
        }
        Err(e) => error_response(&e),
    }
}

/// DELETE /pipelines/{ref}
///
/// A hash-form ref deletes the image (blocked while anything references
/// it); an alias-form ref removes only the alias binding.
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(ref_str): Path<String>,
) -> (StatusCode, Json<Value>) {
    let parsed = match PipelineRef::parse(&ref_str) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(&e),
    };
    match parsed {
        PipelineRef::Hash(hash) => match state.registry.remove_image_by_hash(&hash) {
            Ok(true) => (
                StatusCode::OK,
                Json(json!({"success": true, "deleted": true})),
            ),
            Ok(false) => error_response(&SkeinError::Conflict(format!(
                "pipeline {hash} is still referenced by an alias, version, canary, or suspension"
            ))),
            Err(e) => error_response(&e),
        },
        PipelineRef::Alias(name) => match state.registry.remove_alias(&name) {
            Ok(true) => (
                StatusCode::OK,
                Json(json!({"success": true, "deleted": true, "alias": name})),
            ),
            Ok(false) => error_response(&SkeinError::NotFound(format!("alias `{name}`"))),
            Err(e) => error_response(&e),
        },
    }
}

/// PUT /pipelines/{name}/alias
pub async fn put_alias(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let hash = match require_str(&body, "structuralHash") {
        Ok(h) => h,
        Err(e) => return error_response(&e),
    };
    match state.registry.set_alias(&name, hash) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"success": true, "alias": name, "structuralHash": hash})),
        ),
        Err(e) => error_response(&e),
    }
}
