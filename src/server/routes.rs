//! HTTP route handlers for the chat API.
//!
//! Caller identity arrives pre-resolved in the `X-User-Id` header (the
//! authentication collaborator terminates upstream); the core trusts it and
//! never re-derives it.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::chat::error::ChatError;
use crate::chat::ids::{SessionId, UserId};
use crate::chat::types::{HistoryEntry, SessionSummary};

use super::state::AppState;

/// Header carrying the identity resolved by the auth collaborator.
pub const USER_HEADER: &str = "x-user-id";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health/ollama", get(ollama_health))
        .route("/api/chat", post(chat_message))
        .route("/api/chat-history", get(chat_history))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", put(rename_session).delete(delete_session))
        .route("/api/sessions/{id}/clear", post(clear_session))
        .with_state(state)
}

/// JSON error payload.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Map a core error onto the HTTP surface.
fn chat_error(err: ChatError) -> ApiError {
    match err {
        ChatError::Validation(message) => api_error(StatusCode::BAD_REQUEST, message),
        ChatError::Authorization => api_error(StatusCode::FORBIDDEN, err.to_string()),
        ChatError::Conflict(message) => api_error(StatusCode::CONFLICT, message),
        ChatError::Storage(message) => {
            error!(%message, "storage failure surfaced to HTTP");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
        }
    }
}

/// Extract the resolved caller identity, or 401 if the collaborator broke
/// its contract.
fn owner_from(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|raw| !raw.is_empty())
        .map(UserId::from)
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "not authenticated"))
}

fn parse_session(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::from_str(raw)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid session id"))
}

/// Gate every session-scoped route on ownership; absent and foreign
/// sessions collapse to the same denied outcome.
async fn ensure_owner(
    state: &AppState,
    id: SessionId,
    owner: &UserId,
) -> Result<(), ApiError> {
    match state.sessions.verify_ownership(id, owner).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(chat_error(ChatError::Authorization)),
        Err(err) => Err(chat_error(err)),
    }
}

/// Process liveness probe.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "parlance",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Backend health probe, 503 when unhealthy.
async fn ollama_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.gateway.check_health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// Chat turn request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Target session; when omitted the most recent session is used, or a
    /// default one is created.
    pub session_id: Option<String>,
}

/// Chat turn response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The reply text (possibly a degraded diagnostic).
    pub reply: String,
    /// The session the exchange was recorded in.
    pub session_id: SessionId,
}

/// Handle one conversational turn.
async fn chat_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let owner = owner_from(&headers)?;
    let session_id = match request.session_id.as_deref() {
        Some(raw) => parse_session(raw)?,
        None => state
            .sessions
            .resolve_or_create_default(&owner)
            .await
            .map_err(chat_error)?,
    };

    let reply = state
        .chat
        .handle_message(&owner, session_id, &request.message)
        .await
        .map_err(chat_error)?;

    Ok(Json(ChatResponse { reply, session_id }))
}

/// History fetch parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Session to replay.
    pub session_id: String,
}

/// History fetch response, oldest first.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Recorded exchanges.
    pub history: Vec<HistoryEntry>,
}

/// Return a session's full history.
async fn chat_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let owner = owner_from(&headers)?;
    let session_id = parse_session(&params.session_id)?;
    ensure_owner(&state, session_id, &owner).await?;

    let history = state
        .sessions
        .history(session_id)
        .await
        .map_err(chat_error)?;
    Ok(Json(HistoryResponse { history }))
}

/// Session list response, newest-updated first.
#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    /// The caller's sessions with derived previews.
    pub sessions: Vec<SessionSummary>,
}

/// List the caller's sessions.
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionsResponse>, ApiError> {
    let owner = owner_from(&headers)?;
    let sessions = state.sessions.list(&owner).await.map_err(chat_error)?;
    Ok(Json(SessionsResponse { sessions }))
}

/// Session creation request.
#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    /// Optional title; defaults to "New Chat".
    pub title: Option<String>,
}

/// Create a session for the caller, returning its full summary.
async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSummary>), ApiError> {
    let owner = owner_from(&headers)?;
    let summary = state
        .sessions
        .create(&owner, request.title.as_deref())
        .await
        .map_err(chat_error)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Rename request.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// The new title; must be non-empty after trimming.
    pub title: String,
}

/// Rename a session the caller owns.
async fn rename_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from(&headers)?;
    let session_id = parse_session(&id)?;
    ensure_owner(&state, session_id, &owner).await?;

    state
        .sessions
        .rename(session_id, &request.title)
        .await
        .map_err(chat_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a session the caller owns, cascading to its messages.
async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from(&headers)?;
    let session_id = parse_session(&id)?;
    ensure_owner(&state, session_id, &owner).await?;

    state.sessions.delete(session_id).await.map_err(chat_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Clear a session's messages, keeping the session.
async fn clear_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from(&headers)?;
    let session_id = parse_session(&id)?;
    ensure_owner(&state, session_id, &owner).await?;

    state.sessions.clear(session_id).await.map_err(chat_error)?;
    Ok(StatusCode::NO_CONTENT)
}
