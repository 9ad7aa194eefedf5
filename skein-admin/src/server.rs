use crate::handlers;
use axum::routing::{delete, get, post, put};
use axum::Router as AxumRouter;
use skein_runtime::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the REST API.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Build the axum router with every control-plane route.
///
/// Refs and names are single path segments; aliases containing `/`
/// (relative-path loads) are addressed percent-encoded.
pub fn build_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        // Health
        .route("/health", get(handlers::health::health_check))
        // Compile & execute
        .route("/compile", post(handlers::compile::compile))
        .route("/execute", post(handlers::execute::execute))
        .route("/run", post(handlers::execute::run))
        // Suspended executions
        .route("/executions", get(handlers::executions::list_executions))
        .route("/executions/{id}", get(handlers::executions::get_execution))
        .route(
            "/executions/{id}/resume",
            post(handlers::executions::resume_execution),
        )
        .route(
            "/executions/{id}",
            delete(handlers::executions::delete_execution),
        )
        // Pipelines
        .route("/pipelines", get(handlers::pipelines::list_pipelines))
        // `{name}` here is a full pipeline ref (hash, sha256:-prefixed
        // hash, or alias); the segment name matches the sibling routes
        // because extraction is positional.
        .route("/pipelines/{name}", get(handlers::pipelines::get_pipeline))
        .route(
            "/pipelines/{name}",
            delete(handlers::pipelines::delete_pipeline),
        )
        .route(
            "/pipelines/{name}/alias",
            put(handlers::pipelines::put_alias),
        )
        // Versioning
        .route(
            "/pipelines/{name}/reload",
            post(handlers::versions::reload_pipeline),
        )
        .route(
            "/pipelines/{name}/versions",
            get(handlers::versions::list_versions),
        )
        .route(
            "/pipelines/{name}/rollback",
            post(handlers::versions::rollback_pipeline),
        )
        .route(
            "/pipelines/{name}/rollback/{v}",
            post(handlers::versions::rollback_pipeline_to),
        )
        // Canary
        .route("/pipelines/{name}/canary", get(handlers::canary::get_canary))
        .route(
            "/pipelines/{name}/canary/promote",
            post(handlers::canary::promote_canary),
        )
        .route(
            "/pipelines/{name}/canary/rollback",
            post(handlers::canary::rollback_canary),
        )
        .route(
            "/pipelines/{name}/canary",
            delete(handlers::canary::delete_canary),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the control plane until the shutdown future resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    info!(addr = %addr, "control plane listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
