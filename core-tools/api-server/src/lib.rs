//! HTTP adapter
//!
//! Exposes Cadence conversations over REST. One-shot study-planning tasks run
//! in the background and are polled; sessions are driven one routing cycle
//! per posted message.
//!
//! # Endpoints
//!
//! - GET /health - Liveness
//! - GET / - Service info
//! - POST /api/v1/tasks - Submit a request and run it in the background
//! - GET /api/v1/tasks/:id - Task status, transcript and result
//! - POST /api/v1/sessions - Open a session
//! - POST /api/v1/sessions/:id/messages - Post a human message and run one cycle
//! - GET /api/v1/sessions/:id - Transcript and status
//! - DELETE /api/v1/sessions/:id - Cancel and delete

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cadence_engine::conversation::gate::SYNC_TO_CALENDAR;
use cadence_engine::conversation::{
    Conversation, TerminationReason, ToolStatus, Transcript, TurnBody,
};
use cadence_engine::schedule::ScheduleArtifact;
use cadence_engine::session::{CycleReport, SessionError, SessionManager};
use chrono::{DateTime, Utc};
use sdk::errors::{EngineError, ErrorExt};
use sdk::types::SessionStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub user_message: String,
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
}

/// Outcome of the last calendar sync attempt
#[derive(Debug, Serialize)]
pub struct SyncResult {
    pub status: ToolStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Task as returned by the tasks endpoints
#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub status: SessionStatus,
    pub transcript: Transcript,
    /// Persisted schedule not yet synced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ScheduleArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for TaskView {
    fn from(conversation: Conversation) -> Self {
        let result = last_sync_result(&conversation.transcript);
        Self {
            task_id: conversation.id,
            status: conversation.status,
            transcript: conversation.transcript,
            artifact: conversation.artifact,
            result,
            termination: conversation.termination,
            error_message: conversation.error,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

fn last_sync_result(transcript: &Transcript) -> Option<SyncResult> {
    transcript.turns().iter().rev().find_map(|turn| match &turn.body {
        TurnBody::ToolResult {
            tool,
            status,
            message,
            data,
            ..
        } if tool == SYNC_TO_CALENDAR => Some(SyncResult {
            status: *status,
            message: message.clone(),
            data: data.clone(),
        }),
        _ => None,
    })
}

/// Session as returned by the sessions endpoints
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub transcript: Transcript,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<Conversation> for SessionView {
    fn from(conversation: Conversation) -> Self {
        Self {
            session_id: conversation.id,
            status: conversation.status,
            transcript: conversation.transcript,
            error_message: conversation.error,
        }
    }
}

/// Error body: `{detail, code, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    detail: String,
    message: String,
}

impl ApiError {
    fn validation(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "VALIDATION_ERROR",
            detail: detail.into(),
            message: "Invalid request data".to_string(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let (status, code) = match &err {
            SessionError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SessionError::Busy(_) => (StatusCode::CONFLICT, "SESSION_BUSY"),
            SessionError::Closed { .. } => (StatusCode::GONE, "SESSION_CLOSED"),
            SessionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR"),
        };
        let detail = err.to_string();
        if status.is_server_error() {
            tracing::error!("request failed: {}", detail);
        }
        let engine_err = EngineError::from(err);
        Self {
            status,
            code,
            detail,
            message: engine_err.user_hint().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "detail": self.detail,
                "code": self.code,
                "message": self.message,
            })),
        )
            .into_response()
    }
}

/// Build the application router with CORS and request tracing
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .route("/api/v1/tasks", post(create_task_handler))
        .route("/api/v1/tasks/:id", get(get_task_handler))
        .route("/api/v1/sessions", post(create_session_handler))
        .route(
            "/api/v1/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/v1/sessions/:id/messages", post(post_message_handler))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "Cadence API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "Cadence study planner API",
        "version": env!("CARGO_PKG_VERSION"),
        "health_url": "/health",
    }))
}

async fn create_task_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<Json<TaskView>, ApiError> {
    if payload.user_message.trim().is_empty() {
        return Err(ApiError::validation("user_message must not be empty"));
    }
    if payload.max_turns == Some(0) {
        return Err(ApiError::validation("max_turns must be at least 1"));
    }

    let id = state
        .sessions
        .submit(&payload.user_message, payload.max_turns)
        .await?;
    tracing::info!(task = %id, "task submitted");

    let conversation = state.sessions.get(&id).await?;
    Ok(Json(TaskView::from(conversation)))
}

async fn get_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let conversation = state.sessions.get(&id).await?;
    Ok(Json(TaskView::from(conversation)))
}

async fn create_session_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state.sessions.create_conversation().await?;
    Ok((StatusCode::CREATED, Json(json!({ "session_id": id }))))
}

async fn post_message_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<Json<CycleReport>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::validation("message must not be empty"));
    }

    state.sessions.append_human_turn(&id, &payload.message).await?;
    let report = state.sessions.run_cycle(&id).await?;
    Ok(Json(report))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let conversation = state.sessions.get(&id).await?;
    Ok(Json(SessionView::from(conversation)))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.delete(&id).await? {
        tracing::info!(session = %id, "session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SessionError::NotFound(id).into())
    }
}
