//! Core traits and types for the call dialog pipeline
//!
//! This crate provides the foundational pieces used across all other crates:
//! - Language and script definitions for the supported caller languages
//! - Dialog types (transcripts, responses, intents, entity bundles)
//! - The error taxonomy shared by every stage of a turn
//! - Trait seams for pluggable external collaborators (STT, TTS, NLU, data)

pub mod error;
pub mod language;
pub mod traits;
pub mod types;

pub use error::{DataQueryFailure, Error, Result};
pub use language::{Language, Script};
pub use types::{
    entity_value_present, EntityBundle, EntityMap, IntentResult, IntentSource, ResponseEntry,
    TranscriptEntry, Transcription,
};

pub use traits::{DataBackend, NluClassifier, QueryMethod, SpeechToText, TextToSpeech};
