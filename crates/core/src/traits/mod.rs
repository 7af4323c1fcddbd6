//! Trait seams for external collaborators
//!
//! Every provider is selected by explicit configuration and injected as a
//! trait object; nothing in the pipeline probes for which credentials happen
//! to be set.

pub mod data;
pub mod nlu;
pub mod speech;

pub use data::{DataBackend, QueryMethod};
pub use nlu::NluClassifier;
pub use speech::{SpeechToText, TextToSpeech};
