//! HTTP Endpoints
//!
//! REST API for the call pipeline: the telephony webhook, session and
//! conversation operations, cache introspection, and health checks.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use callflow_core::Language;
use callflow_dialog::{SearchFilter, TurnInput};
use callflow_speech::VOICE_INVENTORY;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        // Telephony surface
        .route("/call/webhook", post(call_webhook))
        .route("/call/hangup", post(call_hangup))
        // Session operations
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id", delete(end_session))
        .route("/api/sessions/purge", post(purge_sessions))
        // Conversation operations
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/stats", get(conversation_stats))
        .route("/api/conversations/:id/export", get(export_conversation))
        .route("/api/conversations/search", get(search_conversations))
        // Cache operations
        .route("/api/cache", get(cache_info))
        .route("/api/cache", delete(clear_cache))
        // Voice inventory
        .route("/api/voices", get(list_voices))
        // Health
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins.
///
/// Disabled means permissive (development only); an empty origin list
/// defaults to localhost.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled, allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let value = origin.parse::<HeaderValue>().ok();
            if value.is_none() {
                tracing::warn!(origin, "invalid CORS origin, skipping");
            }
            value
        })
        .collect();

    if parsed.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        let localhost = HeaderValue::from_static("http://localhost:3000");
        return CorsLayer::new()
            .allow_origin(localhost)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!(origins = parsed.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

/// Inbound telephony webhook payload
#[derive(Debug, Deserialize)]
pub struct CallWebhook {
    pub call_identifier: String,
    pub caller_number: String,
    pub callee_number: Option<String>,
    #[serde(default = "default_direction")]
    pub direction: CallDirection,
    /// Caller utterance audio, base64. Absent on first contact.
    pub audio: Option<String>,
    pub recording_reference: Option<String>,
}

fn default_direction() -> CallDirection {
    CallDirection::Inbound
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Serialize)]
pub struct CallReply {
    pub response: Option<String>,
    pub status: &'static str,
    pub session_id: String,
    pub conversation_id: String,
    pub text: String,
    pub intent: String,
    pub language: Language,
    pub clarification: bool,
    pub call_ended: bool,
}

/// One webhook delivery: first contact greets the caller, a delivery
/// carrying audio runs a full turn. Outbound calls take the same path.
async fn call_webhook(
    State(state): State<AppState>,
    Json(payload): Json<CallWebhook>,
) -> Result<Json<CallReply>, ServerError> {
    if payload.direction == CallDirection::Outbound {
        tracing::info!(call_id = %payload.call_identifier, "outbound call webhook");
    }

    let outcome = match &payload.audio {
        Some(encoded) => {
            let audio = BASE64
                .decode(encoded)
                .map_err(|e| ServerError::InvalidRequest(format!("bad audio encoding: {e}")))?;
            // make sure a session exists even if the greeting delivery was lost
            if state
                .engine
                .sessions()
                .get_by_call_id(&payload.call_identifier)
                .is_err()
            {
                state
                    .engine
                    .handle_incoming_call(&payload.call_identifier, &payload.caller_number)
                    .await?;
            }
            state
                .engine
                .process_turn(TurnInput {
                    call_id: payload.call_identifier.clone(),
                    audio,
                })
                .await?
        }
        None => {
            if payload.recording_reference.is_some() {
                tracing::debug!(call_id = %payload.call_identifier, "recording reference without inline audio");
            }
            state
                .engine
                .handle_incoming_call(&payload.call_identifier, &payload.caller_number)
                .await?
        }
    };

    Ok(Json(CallReply {
        response: outcome.audio_reference.clone(),
        status: "success",
        session_id: outcome.session_id,
        conversation_id: outcome.conversation_id,
        text: outcome.response_text,
        intent: outcome.intent,
        language: outcome.language,
        clarification: outcome.clarification,
        call_ended: outcome.call_ended,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HangupRequest {
    pub call_identifier: String,
}

async fn call_hangup(
    State(state): State<AppState>,
    Json(payload): Json<HangupRequest>,
) -> Result<StatusCode, ServerError> {
    state.engine.handle_hangup(&payload.call_identifier)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.sessions().snapshots())
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let session = state.engine.sessions().get(&id)?;
    Ok(Json(session.snapshot()))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.sessions().end(&id, "completed")?;
    if let Some(conversation) = state.engine.conversations().for_session(&id) {
        state
            .engine
            .conversations()
            .end(&conversation.conversation_id, "completed")?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn purge_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let purged = state.engine.sessions().purge_ended();
    Json(serde_json::json!({ "purged": purged }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.engine.conversations().get(&id)?))
}

async fn conversation_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.engine.conversations().statistics(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "structured".to_string()
}

async fn export_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.engine.conversations().export(&id, &query.format)?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub caller: Option<String>,
    pub intent: Option<String>,
}

async fn search_conversations(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let filter = SearchFilter {
        caller: query.caller,
        intent: query.intent,
        text: query.q,
    };
    Json(state.engine.conversations().search(&filter))
}

async fn cache_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.gateway().cache_info())
}

async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    let cleared = state.engine.gateway().clear_cache();
    Json(serde_json::json!({ "cleared": cleared }))
}

async fn list_voices() -> impl IntoResponse {
    Json(VOICE_INVENTORY)
}

/// Process liveness, independent of downstream provider health
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Readiness reports the data backend probe; liveness never depends on it
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let backend_reachable = state.engine.gateway().validate_connection().await;
    Json(serde_json::json!({
        "status": if backend_reachable { "ready" } else { "degraded" },
        "backend_reachable": backend_reachable,
        "active_sessions": state.engine.sessions().active_count(),
    }))
}
