use super::{error_response, first_str, require_str};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};

/// POST /compile
pub async fn compile(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let source = match require_str(&body, "source") {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    let name = first_str(&body, &["name", "dagName"]);

    match state.registry.compile_and_store(source, name) {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "structuralHash": summary.structural_hash,
                "syntacticHash": summary.syntactic_hash,
                "name": summary.name,
                "reused": summary.reused,
                "errors": [],
            })),
        ),
        Err(e) => error_response(&e),
    }
}
