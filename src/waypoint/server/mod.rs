// SPDX-License-Identifier: MIT

//! HTTP surface over the workflow engines

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::{Checkpoint, CheckpointError, Engine, EngineError, RunResult};
use crate::waypoint::config::Settings;
use crate::waypoint::error::WaypointError;
use crate::waypoint::workflows;

/// Engines by workflow name
#[derive(Clone)]
pub struct AppState {
    engines: Arc<BTreeMap<String, Arc<Engine>>>,
}

impl AppState {
    pub fn new(engines: BTreeMap<String, Arc<Engine>>) -> Self {
        Self {
            engines: Arc::new(engines),
        }
    }

    fn engine(&self, name: &str) -> Result<Arc<Engine>, ApiError> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("workflow '{}' not found", name)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{name}/runs", post(create_run))
        .route("/api/workflows/{name}/runs/stream", post(stream_run))
        .route(
            "/api/workflows/{name}/runs/{thread_id}",
            get(get_run).delete(delete_run),
        )
        .route(
            "/api/workflows/{name}/runs/{thread_id}/resume",
            post(resume_run),
        )
        .route(
            "/api/workflows/{name}/runs/{thread_id}/cancel",
            post(cancel_run),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(settings: &Settings, port: u16) -> Result<(), WaypointError> {
    // request spans from TraceLayer; ignored if a subscriber is already set
    let _ = tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish());

    let state = AppState::new(workflows::engines(settings)?);
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Error body `{"error": ...}` with a matching status code
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { .. } => Self::NotFound(err.to_string()),
            EngineError::Checkpoint(CheckpointError::InvalidThreadId(_)) => {
                Self::BadRequest(err.to_string())
            }
            EngineError::Checkpoint(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => {
                log::error!("Request failed: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub input: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub input: String,
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    let workflows: Vec<Value> = state
        .engines
        .iter()
        .map(|(name, engine)| {
            let description = workflows::BUILTIN
                .iter()
                .find(|(builtin, _)| builtin == name)
                .map(|(_, description)| *description)
                .unwrap_or_default();
            json!({
                "name": name,
                "description": description,
                "entry": engine.graph().entry(),
                "steps": engine.graph().step_names(),
            })
        })
        .collect();
    Json(json!(workflows))
}

async fn create_run(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResult>, ApiError> {
    let engine = state.engine(&name)?;
    log::info!("Starting '{}' run", name);
    Ok(Json(engine.run(&payload.input, payload.thread_id).await))
}

async fn stream_run(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let engine = state.engine(&name)?;
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming '{}' run", name);
        let result = engine.run_stream(&payload.input, payload.thread_id, tx).await;
        log::info!("Streaming run {} ended as {:?}", result.thread_id, result.status);
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}

async fn resume_run(
    State(state): State<AppState>,
    Path((name, thread_id)): Path<(String, String)>,
    Json(payload): Json<ResumeRequest>,
) -> Result<Json<RunResult>, ApiError> {
    let engine = state.engine(&name)?;
    Ok(Json(engine.resume(&payload.input, &thread_id).await?))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path((name, thread_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let engine = state.engine(&name)?;
    let cancelled = engine.cancel(&thread_id).await;
    Ok(Json(json!({ "cancelled": cancelled })))
}

async fn get_run(
    State(state): State<AppState>,
    Path((name, thread_id)): Path<(String, String)>,
) -> Result<Json<Checkpoint>, ApiError> {
    let engine = state.engine(&name)?;
    Ok(Json(engine.snapshot(&thread_id).await?))
}

async fn delete_run(
    State(state): State<AppState>,
    Path((name, thread_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let engine = state.engine(&name)?;
    let deleted = engine.discard(&thread_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
