//! Conduit Server
//!
//! Self-hosted HTTP/SSE API for the agent task orchestrator (§6). This is a
//! library crate — the server is started via [`start_server`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::Method, routing::get, Json, Router};
use conduit_core::agent::model::{ModelClient, ModelResponse, ScriptedModelClient};
use conduit_core::agent::AgentLoop;
use conduit_core::approval::{ApprovalEngine, SharedApprovalEngine};
use conduit_core::orchestrator::TaskOrchestrator;
use conduit_core::tool_tree::ToolTree;
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes;
pub mod types;

/// Configuration for starting the server. Per §6, the only environment
/// inputs the core observes are a model credential, a bind address, and a
/// tool-source configuration; the language-model *provider* integration
/// itself is out of scope (§1) — `model_credential` is accepted and never
/// logged, but the bundled server does not dial a network provider with it.
pub struct ServerConfig {
    pub port: u16,
    pub model_credential: String,
    /// Which bundled demo tool tree to mount (§A6). The only value
    /// currently understood is `"demo"`.
    pub tool_source: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000, model_credential: String::new(), tool_source: "demo".to_string() }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub approvals: SharedApprovalEngine,
    pub agent_loop: Arc<AgentLoop>,
}

/// Build the tool tree named by `tool_source` (§A6). Production embedders
/// supply their own `ToolTree`/`ModelClient` via the library API directly
/// rather than through this demo binary's config surface.
fn bootstrap_tools(_tool_source: &str) -> ToolTree {
    conduit_core::demo_tools::demo_tools()
}

/// The bundled binary's default `Generate` capability: a scripted client
/// good for a smoke test, not a production deployment. Embedding callers
/// should construct their own [`ModelClient`] and drive [`AgentLoop`]
/// directly instead of going through [`start_server`] (§A5 — no network
/// model provider is implemented here).
fn default_model() -> Arc<dyn ModelClient> {
    Arc::new(ScriptedModelClient::new(vec![ModelResponse::text(
        "This is the bundled demo server's scripted reply; supply a real ModelClient via the library API for production use.",
    )]))
}

/// Build the Axum router with all routes.
pub fn build_router(config: &ServerConfig) -> (Router, AppState) {
    if config.model_credential.is_empty() {
        tracing::warn!("no model credential configured");
    }

    let approvals: SharedApprovalEngine = Arc::new(ApprovalEngine::new());
    let orchestrator = Arc::new(TaskOrchestrator::new(approvals.clone()));
    let tools = bootstrap_tools(&config.tool_source);
    let agent_loop = Arc::new(AgentLoop::new(default_model(), tools, orchestrator.clone(), approvals.clone()));

    let state = AppState { orchestrator, approvals, agent_loop };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .merge(routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Start the server and block until shutdown.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let (app, _state) = build_router(&config);

    tracing::info!("conduit server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}
