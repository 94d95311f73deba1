//! HTTP gateway for Waypoint.
//!
//! Exposes the orchestrator over HTTP: a health check plus the v1 API with
//! streamed (SSE) and collected chat turns, thread state and a live feed of
//! domain events.
//!
//! Built on Axum; every turn is delegated to [`Orchestrator`].

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use waypoint_config::{AppConfig, GatewayConfig};
use waypoint_workflow::Orchestrator;

/// Request bodies above this size are rejected.
const BODY_LIMIT: usize = 64 * 1024;

/// Build the full router: `/health` plus the v1 API nested under `/v1`.
///
/// Layers applied:
/// - CORS restricted to the local origin and the configured extra origin
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(orchestrator: Orchestrator, config: &GatewayConfig) -> Router {
    let api_state = Arc::new(api_v1::ApiV1State { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(config)))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn allowed_origins(config: &GatewayConfig) -> Vec<HeaderValue> {
    let mut origins = Vec::new();
    let local = format!("http://localhost:{}", config.port);
    for origin in std::iter::once(local.as_str()).chain(config.allow_origin.as_deref()) {
        match HeaderValue::from_str(origin) {
            Ok(value) => origins.push(value),
            Err(_) => warn!(origin, "Ignoring malformed CORS origin"),
        }
    }
    origins
}

/// Start the gateway HTTP server on the configured address.
///
/// Opens the configured state store and wires the built-in collaborators
/// once; every request shares them through the orchestrator.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let gateway = config.gateway.clone();

    let store = waypoint_store::open(&config.store).await?;
    let orchestrator = Orchestrator::from_config(config, store)?;
    let app = build_router(orchestrator, &gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
