//! Consultation HTTP surface.
//!
//! - `POST   /api/v1/sessions/{session_id}/intake`   submit the intake form
//! - `POST   /api/v1/sessions/{session_id}/messages` send a chat message
//! - `GET    /api/v1/sessions/{session_id}/history`  `role: content` lines
//! - `GET    /api/v1/sessions/{session_id}/stream`   SSE reply chunks
//! - `DELETE /api/v1/sessions/{session_id}`          clear the conversation

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::Stream;
use medchat_agent::{ConsultationOrchestrator, StreamEvent, TurnReply};
use medchat_core::domain::consultation::SessionId;
use medchat_core::domain::intake::IntakeData;
use medchat_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConsultationOrchestrator>,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRequest {
    pub intake_data: IntakeData,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

/// Interface error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, Some(message.clone()))
            }
            InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/sessions/{session_id}", delete(clear_session))
        .route("/api/v1/sessions/{session_id}/intake", post(submit_intake))
        .route("/api/v1/sessions/{session_id}/messages", post(send_message))
        .route("/api/v1/sessions/{session_id}/history", get(history))
        .route("/api/v1/sessions/{session_id}/stream", get(stream_replies))
        .with_state(state)
}

fn parse_session(raw: &str, correlation_id: &str) -> Result<SessionId, ApiError> {
    SessionId::parse(raw)
        .map_err(|error| InterfaceError::bad_request(error.to_string(), correlation_id).into())
}

async fn within_deadline<F>(
    state: &AppState,
    session_id: &SessionId,
    correlation_id: &str,
    turn: F,
) -> Result<TurnReply, ApiError>
where
    F: Future<Output = TurnReply>,
{
    match tokio::time::timeout(state.request_timeout, turn).await {
        Ok(reply) => Ok(reply),
        Err(_) => {
            warn!(
                event_name = "http.turn_timed_out",
                correlation_id,
                session_id = %session_id,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "consultation turn exceeded request timeout"
            );
            Err(ApplicationError::Timeout(state.request_timeout.as_secs())
                .into_interface(correlation_id)
                .into())
        }
    }
}

pub async fn submit_intake(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<IntakeRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session(&session_id, &correlation_id)?;

    let reply = within_deadline(
        &state,
        &session_id,
        &correlation_id,
        state.orchestrator.process_intake(&session_id, request.intake_data),
    )
    .await?;

    info!(
        event_name = "http.intake_processed",
        correlation_id = %correlation_id,
        turn_correlation_id = %reply.correlation_id,
        session_id = %session_id,
        step = %reply.state.current_step(),
        "intake turn completed"
    );
    Ok(Json(reply))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session(&session_id, &correlation_id)?;
    if request.message.trim().is_empty() {
        return Err(InterfaceError::bad_request("message must not be empty", correlation_id).into());
    }

    let reply = within_deadline(
        &state,
        &session_id,
        &correlation_id,
        state.orchestrator.process_message(&session_id, &request.message),
    )
    .await?;

    info!(
        event_name = "http.message_processed",
        correlation_id = %correlation_id,
        turn_correlation_id = %reply.correlation_id,
        session_id = %session_id,
        step = %reply.state.current_step(),
        "message turn completed"
    );
    Ok(Json(reply))
}

pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session(&session_id, &correlation_id)?;
    Ok(Json(HistoryResponse { history: state.orchestrator.history(&session_id) }))
}

pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session(&session_id, &correlation_id)?;
    let existed = state.orchestrator.clear(&session_id).await;
    info!(
        event_name = "http.session_cleared",
        correlation_id = %correlation_id,
        session_id = %session_id,
        existed,
        "conversation cleared"
    );
    Ok(Json(ClearResponse { success: true }))
}

pub async fn stream_replies(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session(&session_id, &correlation_id)?;
    let receiver = state.orchestrator.streams().subscribe(&session_id);
    info!(
        event_name = "http.stream_opened",
        correlation_id = %correlation_id,
        session_id = %session_id,
        "reply stream subscribed"
    );

    Ok(Sse::new(reply_events(receiver)).keep_alive(KeepAlive::default()).into_response())
}

/// Ends after the first `done` event or when the session is cleared.
fn reply_events(
    mut receiver: broadcast::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let finished = matches!(event, StreamEvent::Done { .. });
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.name()).data(data));
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(event_name = "http.stream_lagged", missed, "reply stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
