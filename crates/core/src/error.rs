//! Error taxonomy for the dialog pipeline
//!
//! Most of these never reach the caller as-is: the orchestrator turns
//! blocking failures into a spoken apology in the caller's language, and
//! absorbs single-source failures (one STT backend, one lookup) entirely.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("a session is already active for call {0}")]
    DuplicateSession(String),

    #[error("unsupported language: {0}")]
    LanguageUnsupported(String),

    /// Both transcription backends failed; the turn proceeds with an empty
    /// transcript at confidence 0.
    #[error("all transcription backends unavailable")]
    TranscriptionUnavailable,

    #[error("intent could not be resolved")]
    IntentUnresolved,

    /// Required entities absent from the utterance. Triggers a clarification
    /// turn, not a caller-facing error.
    #[error("missing required entities: {}", .0.join(", "))]
    MissingEntities(Vec<String>),

    #[error("no query definition for intent: {0}")]
    UnknownIntent(String),

    #[error("data query failed: {0}")]
    DataQuery(#[from] DataQueryFailure),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Transport-level breakdown of a failed data backend call
#[derive(Error, Debug)]
pub enum DataQueryFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Whether this failure should surface to the caller as a spoken
    /// apology rather than a clarification request.
    pub fn is_caller_apology(&self) -> bool {
        matches!(
            self,
            Error::TranscriptionUnavailable
                | Error::UnknownIntent(_)
                | Error::DataQuery(_)
                | Error::Synthesis(_)
        )
    }
}
