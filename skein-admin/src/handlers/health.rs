use crate::server::AppState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "pipelines": state.registry.pipelines().image_count(),
        "suspensions": state.registry.suspensions().len(),
        "activeCanaries": state.registry.canaries().active_count(),
    }))
}
