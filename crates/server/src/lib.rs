//! Callflow Server
//!
//! HTTP surface for the dialog pipeline: the telephony webhook, session and
//! conversation operations, cache introspection, and health checks.

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<callflow_core::Error> for ServerError {
    fn from(err: callflow_core::Error) -> Self {
        use callflow_core::Error;
        match err {
            Error::SessionNotFound(id) => ServerError::NotFound(format!("session {id}")),
            Error::ConversationNotFound(id) => ServerError::NotFound(format!("conversation {id}")),
            Error::DuplicateSession(id) => ServerError::Conflict(format!("call {id} already has a session")),
            Error::InvalidRequest(msg) => ServerError::InvalidRequest(msg),
            Error::MissingEntities(list) => {
                ServerError::InvalidRequest(format!("missing entities: {}", list.join(", ")))
            }
            Error::UnknownIntent(intent) => ServerError::InvalidRequest(format!("unknown intent {intent}")),
            Error::DataQuery(e) => ServerError::Upstream(e.to_string()),
            Error::Synthesis(msg) => ServerError::Upstream(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => axum::http::StatusCode::CONFLICT,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Upstream(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let message = self.to_string();
        let status: axum::http::StatusCode = self.into();
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}
