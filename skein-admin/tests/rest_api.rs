//! Integration tests for the REST control plane.
//!
//! Uses `tower::ServiceExt::oneshot` to call handlers without binding a
//! real TCP port — every test gets a fresh in-memory registry.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use skein_admin::server::{build_router, AppState};
use skein_runtime::Registry;
use std::sync::Arc;
use tower::ServiceExt; // .oneshot()

// ── Helpers ───────────────────────────────────────────────────

fn make_app() -> axum::Router {
    build_router(AppState {
        registry: Arc::new(Registry::in_memory()),
    })
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_req(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn call(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp).await)
}

async fn compile(app: &axum::Router, source: &str, name: &str) -> String {
    let (status, body) = call(app, post("/compile", json!({"source": source, "name": name}))).await;
    assert_eq!(status, StatusCode::OK, "compile failed: {body}");
    body["structuralHash"].as_str().unwrap().to_string()
}

// ── Health ────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_returns_200() {
    let app = make_app();
    let (status, body) = call(&app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

// ── Compile + execute (scenario: compile, alias, execute) ─────

#[tokio::test]
async fn compile_then_execute_by_alias() {
    let app = make_app();
    let (status, body) = call(
        &app,
        post(
            "/compile",
            json!({"source": "in x: Int\nout x", "name": "passthrough"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["name"], json!("passthrough"));
    assert_eq!(body["errors"], json!([]));
    let hash = body["structuralHash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);

    let (status, body) = call(
        &app,
        post("/execute", json!({"ref": "passthrough", "inputs": {"x": 42}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("completed"));
    assert_eq!(body["outputs"], json!({"x": 42}));
    assert_eq!(body["resumptionCount"], json!(0));
}

#[tokio::test]
async fn compile_reports_diagnostics() {
    let app = make_app();
    let (status, body) = call(&app, post("/compile", json!({"source": "out nope"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("compile_error"));
    assert_eq!(body["errors"][0]["code"], json!("E003"));
}

#[tokio::test]
async fn compile_accepts_legacy_dag_name() {
    let app = make_app();
    let (status, body) = call(
        &app,
        post("/compile", json!({"source": "out a = 1", "dagName": "legacy"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("legacy"));
}

#[tokio::test]
async fn execute_by_prefixed_hash() {
    let app = make_app();
    let hash = compile(&app, "in x: Int\nout x", "p").await;
    let (status, body) = call(
        &app,
        post(
            "/execute",
            json!({"ref": format!("sha256:{hash}"), "inputs": {"x": 7}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outputs"], json!({"x": 7}));
}

#[tokio::test]
async fn execute_unknown_ref_is_404() {
    let app = make_app();
    let (status, body) = call(
        &app,
        post("/execute", json!({"ref": "ghost", "inputs": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}

#[tokio::test]
async fn execute_blank_ref_is_400() {
    let app = make_app();
    let (status, body) = call(&app, post("/execute", json!({"ref": "  ", "inputs": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid_ref"));
}

#[tokio::test]
async fn execute_type_mismatch_is_400() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (status, body) = call(
        &app,
        post("/execute", json!({"ref": "p", "inputs": {"x": "nope"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("input_type_mismatch"));
}

#[tokio::test]
async fn run_compiles_and_executes() {
    let app = make_app();
    let (status, body) = call(
        &app,
        post("/run", json!({"source": "in x: Int\nout y = x * 2", "inputs": {"x": 21}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outputs"], json!({"y": 42}));
}

// ── Suspension round-trip (scenario S3) ───────────────────────

#[tokio::test]
async fn suspension_roundtrip() {
    let app = make_app();
    compile(&app, "in x: Int\nin y: Int\nout x", "two-input").await;

    let (status, body) = call(
        &app,
        post("/execute", json!({"ref": "two-input", "inputs": {"x": 5}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true), "suspension is not a failure");
    assert_eq!(body["status"], json!("suspended"));
    assert_eq!(body["missingInputs"], json!({"y": "Int"}));
    let execution_id = body["executionId"].as_str().unwrap().to_string();

    let (status, body) = call(&app, get_req("/executions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));

    let (status, body) = call(
        &app,
        post(
            &format!("/executions/{execution_id}/resume"),
            json!({"additionalInputs": {"y": 7}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("completed"));
    assert_eq!(body["outputs"], json!({"x": 5}));
    assert_eq!(body["resumptionCount"], json!(1));

    let (_, body) = call(&app, get_req("/executions")).await;
    assert_eq!(body["total"], json!(0), "record deleted on completion");
}

#[tokio::test]
async fn get_and_delete_execution() {
    let app = make_app();
    compile(&app, "in x: Int\nin y: Int\nout x", "p").await;
    let (_, body) = call(&app, post("/execute", json!({"ref": "p", "inputs": {"x": 1}}))).await;
    let id = body["executionId"].as_str().unwrap().to_string();

    let (status, body) = call(&app, get_req(&format!("/executions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providedInputs"], json!({"x": 1}));

    let (status, _) = call(&app, delete_req(&format!("/executions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, get_req(&format!("/executions/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resume_unknown_execution_is_404() {
    let app = make_app();
    let id = uuid::Uuid::new_v4();
    let (status, body) = call(
        &app,
        post(&format!("/executions/{id}/resume"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}

#[tokio::test]
async fn malformed_execution_id_is_400() {
    let app = make_app();
    let (status, _) = call(&app, get_req("/executions/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Pipelines ─────────────────────────────────────────────────

#[tokio::test]
async fn list_and_get_pipelines() {
    let app = make_app();
    let hash = compile(&app, "in x: Int\nout x", "p").await;

    let (status, body) = call(&app, get_req("/pipelines")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["list"][0]["aliases"], json!(["p"]));

    let (status, body) = call(&app, get_req("/pipelines/p")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["structuralHash"], json!(hash));
    assert_eq!(body["declaredInputs"], json!({"x": "Int"}));
}

#[tokio::test]
async fn alias_update_via_put() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let other = compile(&app, "out k = 1", "q").await;

    let (status, _) = call(
        &app,
        put("/pipelines/p/alias", json!({"structuralHash": other})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, get_req("/pipelines/p")).await;
    assert_eq!(body["structuralHash"], json!(other));
}

#[tokio::test]
async fn alias_to_unknown_hash_is_404() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (status, _) = call(
        &app,
        put(
            "/pipelines/p/alias",
            json!({"structuralHash": "0".repeat(64)}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Delete policy (scenario S4) ───────────────────────────────

#[tokio::test]
async fn delete_refuses_while_alias_exists() {
    let app = make_app();
    let hash = compile(&app, "in x: Int\nout x", "keep").await;

    let (status, body) = call(&app, delete_req(&format!("/pipelines/sha256:{hash}"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("conflict"));

    let (status, _) = call(&app, delete_req("/pipelines/keep")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, delete_req(&format!("/pipelines/sha256:{hash}"))).await;
    assert_eq!(status, StatusCode::OK, "unreferenced image deletes: {body}");

    let (status, _) = call(&app, get_req(&format!("/pipelines/{hash}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Reload & versions ─────────────────────────────────────────

#[tokio::test]
async fn reload_swaps_and_lists_versions() {
    let app = make_app();
    let h1 = compile(&app, "in x: Int\nout x", "p").await;

    let (status, body) = call(
        &app,
        post(
            "/pipelines/p/reload",
            json!({"source": "in x: Int\nout y = x + 1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], json!(true));
    assert_eq!(body["previousHash"], json!(h1));
    let h2 = body["newHash"].as_str().unwrap().to_string();

    let (_, body) = call(&app, get_req("/pipelines/p")).await;
    assert_eq!(body["structuralHash"], json!(h2));

    let (status, body) = call(&app, get_req("/pipelines/p/versions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["active"], json!(1));
}

#[tokio::test]
async fn reload_unchanged_is_noop() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (status, body) = call(
        &app,
        post("/pipelines/p/reload", json!({"source": "in x: Int\nout x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], json!(false));
}

#[tokio::test]
async fn reload_without_source_is_400() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (status, body) = call(&app, post("/pipelines/p/reload", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("no_source"));
}

#[tokio::test]
async fn rollback_returns_to_previous_version() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (_, first) = call(
        &app,
        post("/pipelines/p/reload", json!({"source": "in x: Int\nout y = x + 1"})),
    )
    .await;
    let h_v1 = first["newHash"].as_str().unwrap().to_string();
    call(
        &app,
        post("/pipelines/p/reload", json!({"source": "in x: Int\nout y = x + 2"})),
    )
    .await;

    let (status, body) = call(&app, post("/pipelines/p/rollback", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], json!(1));
    assert_eq!(body["structuralHash"], json!(h_v1));

    let (_, body) = call(&app, get_req("/pipelines/p")).await;
    assert_eq!(body["structuralHash"], json!(h_v1));
}

#[tokio::test]
async fn rollback_without_history_is_404() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (status, _) = call(&app, post("/pipelines/p/rollback", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Canary lifecycle (scenarios S2, S5) ───────────────────────

#[tokio::test]
async fn reload_under_canary_with_autopromote() {
    let app = make_app();
    let h1 = compile(&app, "in x: Int\nout x", "passthrough").await;

    let (status, body) = call(
        &app,
        post(
            "/pipelines/passthrough/reload",
            json!({
                "source": "in x: Int\nin y: Int\nout x",
                "canary": {
                    "initialWeight": 1.0,
                    "promotionSteps": [1.0],
                    "observationWindow": "0s",
                    "minRequests": 1,
                    "autoPromote": true,
                },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "reload failed: {body}");
    assert_eq!(body["canary"]["status"], json!("observing"));
    let h2 = body["newHash"].as_str().unwrap().to_string();

    // Immediately after reload the alias still points at the old hash.
    let (_, body) = call(&app, get_req("/pipelines/passthrough")).await;
    assert_eq!(body["structuralHash"], json!(h1));

    // One successful execution trips the auto-promotion.
    let (status, body) = call(
        &app,
        post(
            "/execute",
            json!({"ref": "passthrough", "inputs": {"x": 1, "y": 2}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("completed"));

    let (status, body) = call(&app, get_req("/pipelines/passthrough/canary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canary"]["status"], json!("complete"));

    // The watcher repointed the alias.
    let (_, body) = call(&app, get_req("/pipelines/passthrough")).await;
    assert_eq!(body["structuralHash"], json!(h2));
}

#[tokio::test]
async fn canary_rolls_back_on_error_rate() {
    let app = make_app();
    let h1 = compile(&app, "in x: Int\nout x", "p").await;

    let (status, _) = call(
        &app,
        post(
            "/pipelines/p/reload",
            json!({
                // Compiles fine, fails at runtime.
                "source": "in x: Int\nout q = x / 0",
                "canary": {
                    "initialWeight": 1.0,
                    "promotionSteps": [1.0],
                    "observationWindow": "0s",
                    "minRequests": 2,
                    "errorThreshold": 0.05,
                    "autoPromote": true,
                },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Two failing executions on the new side.
    for _ in 0..2 {
        let (status, body) = call(
            &app,
            post("/execute", json!({"ref": "p", "inputs": {"x": 1}})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("engine_error"));
    }

    let (_, body) = call(&app, get_req("/pipelines/p/canary")).await;
    assert_eq!(body["canary"]["status"], json!("rolledBack"));
    assert_eq!(body["canary"]["currentWeight"], json!(0.0));

    // Traffic flows to the old version again.
    let (status, body) = call(
        &app,
        post("/execute", json!({"ref": "p", "inputs": {"x": 9}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outputs"], json!({"x": 9}));
    let (_, body) = call(&app, get_req("/pipelines/p")).await;
    assert_eq!(body["structuralHash"], json!(h1));
}

#[tokio::test]
async fn canary_conflict_on_second_start() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let canary = json!({
        "initialWeight": 0.5,
        "promotionSteps": [1.0],
        "observationWindow": "1m",
        "minRequests": 5,
        "autoPromote": false,
    });

    let (status, _) = call(
        &app,
        post(
            "/pipelines/p/reload",
            json!({"source": "in x: Int\nout y = x + 1", "canary": canary.clone()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        post(
            "/pipelines/p/reload",
            json!({"source": "in x: Int\nout y = x + 2", "canary": canary}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("conflict"));
}

#[tokio::test]
async fn manual_canary_promote_and_delete() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (_, body) = call(
        &app,
        post(
            "/pipelines/p/reload",
            json!({
                "source": "in x: Int\nout y = x + 1",
                "canary": {
                    "initialWeight": 0.2,
                    "promotionSteps": [0.5, 1.0],
                    "observationWindow": "1h",
                    "minRequests": 100,
                    "autoPromote": false,
                },
            }),
        ),
    )
    .await;
    let h2 = body["newHash"].as_str().unwrap().to_string();

    let (status, body) = call(&app, post("/pipelines/p/canary/promote", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canary"]["currentWeight"], json!(0.5));
    assert_eq!(body["canary"]["status"], json!("observing"));

    let (_, body) = call(&app, post("/pipelines/p/canary/promote", json!({}))).await;
    assert_eq!(body["canary"]["status"], json!("complete"));

    // Completion committed the alias swap.
    let (_, body) = call(&app, get_req("/pipelines/p")).await;
    assert_eq!(body["structuralHash"], json!(h2));

    let (status, _) = call(&app, delete_req("/pipelines/p/canary")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, get_req("/pipelines/p/canary")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn canary_explicit_rollback_restores_active_version() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    call(
        &app,
        post(
            "/pipelines/p/reload",
            json!({
                "source": "in x: Int\nout y = x + 1",
                "canary": {
                    "initialWeight": 0.5,
                    "promotionSteps": [1.0],
                    "observationWindow": "1h",
                    "minRequests": 100,
                    "autoPromote": false,
                },
            }),
        ),
    )
    .await;

    let (status, body) = call(&app, post("/pipelines/p/canary/rollback", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canary"]["status"], json!("rolledBack"));

    let (_, body) = call(&app, get_req("/pipelines/p/versions")).await;
    assert_eq!(body["active"], json!(1), "active pointer restored to the old side");
}

#[tokio::test]
async fn canary_get_without_canary_is_404() {
    let app = make_app();
    compile(&app, "in x: Int\nout x", "p").await;
    let (status, _) = call(&app, get_req("/pipelines/p/canary")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
