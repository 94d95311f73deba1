//! HTTP API v1 - chat turns and thread inspection.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`                      : Run a turn, get all its events as JSON
//! - `POST /v1/chat/stream`               : Run a turn, get its events as SSE
//! - `GET  /v1/threads`                   : List persisted thread ids
//! - `GET  /v1/threads/{thread_id}`       : Persisted conversation state
//! - `GET  /v1/threads/{thread_id}/traces`: Recent turn traces of a thread
//! - `GET  /v1/usage`                     : Aggregated telemetry report
//! - `GET  /v1/events`                    : SSE feed of domain events

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{error, info};

use waypoint_core::{ConversationState, ProtocolEvent};
use waypoint_telemetry::{TelemetrySnapshot, Trace};
use waypoint_workflow::{Orchestrator, OrchestratorError};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub orchestrator: Orchestrator,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/threads", get(list_threads_handler))
        .route("/threads/{thread_id}", get(get_thread_handler))
        .route("/threads/{thread_id}/traces", get(thread_traces_handler))
        .route("/usage", get(usage_handler))
        .route("/events", get(event_stream_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct ThreadListResponse {
    pub threads: Vec<String>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

impl From<OrchestratorError> for ErrorResponse {
    fn from(e: OrchestratorError) -> Self {
        Self { error: e.to_string() }
    }
}

fn map_orchestrator_error(e: OrchestratorError) -> ApiError {
    match e {
        OrchestratorError::InvalidInput(_) => (StatusCode::BAD_REQUEST, Json(e.into())),
        OrchestratorError::Store(ref inner) => {
            error!(error = %inner, "State store failure");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "state store unavailable")
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/chat` - Run one turn and return every event it emitted.
async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<Vec<ProtocolEvent>>, ApiError> {
    info!(thread = %payload.thread_id, "v1/chat request");

    let events = state
        .orchestrator
        .run_turn_collect(&payload.thread_id, &payload.message)
        .await
        .map_err(map_orchestrator_error)?;
    Ok(Json(events))
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/chat/stream` - Run one turn, receive its events as SSE.
///
/// The SSE event name is the protocol `event_type`; the data is the full
/// event JSON. Closing the connection cancels the turn.
async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(thread = %payload.thread_id, "v1/chat/stream SSE request");

    let rx = state
        .orchestrator
        .stream_turn(&payload.thread_id, &payload.message)
        .await
        .map_err(map_orchestrator_error)?;

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type().as_str();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `GET /v1/events` - SSE feed of domain events (turns, nodes, tools, rules).
async fn event_stream_handler(
    State(state): State<SharedApiState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.orchestrator.services().events.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.name()).data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── Threads ───────────────────────────────────────────────────────────────

async fn list_threads_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ThreadListResponse>, ApiError> {
    let threads = state
        .orchestrator
        .list_threads()
        .await
        .map_err(map_orchestrator_error)?;
    let count = threads.len();
    Ok(Json(ThreadListResponse { threads, count }))
}

async fn get_thread_handler(
    State(state): State<SharedApiState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ConversationState>, ApiError> {
    match state.orchestrator.thread_state(&thread_id).await {
        Ok(Some(thread)) => Ok(Json(thread)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("thread not found: {thread_id}"),
        )),
        Err(e) => Err(map_orchestrator_error(e)),
    }
}

// ── Telemetry ─────────────────────────────────────────────────────────────

async fn thread_traces_handler(
    State(state): State<SharedApiState>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Trace>>, ApiError> {
    let Some(telemetry) = &state.orchestrator.services().telemetry else {
        return Err(api_error(StatusCode::NOT_FOUND, "telemetry is disabled"));
    };
    Ok(Json(telemetry.traces_for_thread(&thread_id)))
}

async fn usage_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<TelemetrySnapshot>, ApiError> {
    let Some(telemetry) = &state.orchestrator.services().telemetry else {
        return Err(api_error(StatusCode::NOT_FOUND, "telemetry is disabled"));
    };
    Ok(Json(telemetry.snapshot()))
}
