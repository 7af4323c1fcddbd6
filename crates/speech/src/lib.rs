//! Speech provider wiring: dual-backend transcription fusion and the HTTP
//! clients for the external STT, TTS, and NLU services.

pub mod fusion;
pub mod providers;

pub use fusion::{FusedTranscript, TranscriptionFuser};
pub use providers::{
    default_voice, HttpNluProvider, HttpSttProvider, HttpTtsProvider, Voice, VOICE_INVENTORY,
};
