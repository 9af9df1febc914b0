//! HTTP server: MCP endpoint behind bearer auth, plus health and
//! OAuth protected-resource metadata.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use noteconf::{AuthConfig, NoteConfig, StorageBackend};
use notestore::{MemoryBackend, NodeStore, SqliteBackend};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::{require_identity, Gatekeeper};
use crate::mcp::{self, McpState};
use crate::tools::ToolRouter;

/// Server state for the health endpoint.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Instant,
    pub storage: &'static str,
}

pub async fn handle_health(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage,
    }))
}

/// Where clients discover how to obtain a token for `/mcp`.
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    pub api_base_url: String,
    pub issuer_url: String,
}

impl ResourceMetadata {
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self {
            api_base_url: auth.api_base_url.trim_end_matches('/').to_string(),
            issuer_url: auth.issuer_url.clone(),
        }
    }
}

pub async fn handle_resource_metadata(State(meta): State<Arc<ResourceMetadata>>) -> Response {
    if meta.api_base_url.is_empty() || meta.issuer_url.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "OAuth configuration not set" })),
        )
            .into_response();
    }

    Json(json!({
        "resource": format!("{}/mcp", meta.api_base_url),
        "authorization_servers": [meta.issuer_url],
        "scopes_supported": ["openid", "email", "profile"],
    }))
    .into_response()
}

async fn handle_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

/// Open the store named by config.
pub fn open_store(config: &NoteConfig) -> Result<NodeStore> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(NodeStore::new(Arc::new(MemoryBackend::new()))),
        StorageBackend::Sqlite => {
            let path = config.db_path();
            let backend = SqliteBackend::open_with_timeout(
                &path,
                Duration::from_millis(config.storage.busy_timeout_ms),
            )
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
            Ok(NodeStore::new(Arc::new(backend)))
        }
    }
}

/// Assemble the full application router.
pub fn app(router: ToolRouter, gate: Arc<Gatekeeper>, auth: &AuthConfig) -> Router {
    let health_state = HealthState {
        start_time: Instant::now(),
        storage: router.store().backend_name(),
    };

    let mcp_router = Router::new()
        .route("/mcp", post(mcp::post_handler).get(mcp::stream_handler))
        .route("/mcp/sse", get(mcp::stream_handler))
        .with_state(Arc::new(McpState::new(router)))
        .layer(middleware::from_fn_with_state(gate, require_identity));

    let metadata_router = Router::new()
        .route(
            "/.well-known/oauth-protected-resource",
            get(handle_resource_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(handle_resource_metadata),
        )
        .with_state(Arc::new(ResourceMetadata::from_config(auth)));

    let health_router = Router::new()
        .route("/health", get(handle_health))
        .with_state(health_state);

    Router::new()
        .merge(mcp_router)
        .merge(metadata_router)
        .merge(health_router)
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the server until SIGINT/SIGTERM.
pub async fn run(config: NoteConfig) -> Result<()> {
    info!("notehub starting");

    let store = open_store(&config)?;
    info!(backend = store.backend_name(), "storage ready");

    let gate = Arc::new(Gatekeeper::from_config(&config.auth));
    let app = app(ToolRouter::new(store), gate, &config.auth);

    let addr = config.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("notehub ready");
    info!("   MCP: POST http://{}/mcp", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
