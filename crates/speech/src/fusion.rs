//! Transcription Fusion
//!
//! Runs two independent STT backends concurrently on the same audio and
//! keeps the more confident transcript. One backend failing degrades to the
//! other's result; both failing yields an empty transcript with confidence 0
//! and an explicit unavailable marker rather than an error.

use std::sync::Arc;
use std::time::Duration;

use callflow_core::{Language, SpeechToText, Transcription};
use serde::Serialize;

/// Outcome of fusing two backend transcripts
#[derive(Debug, Clone, Serialize)]
pub struct FusedTranscript {
    pub text: String,
    pub language: Language,
    pub confidence: f32,
    /// Tag of the backend whose transcript was selected
    pub provider: String,
    /// Both transcripts concatenated when they disagree, for log inspection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_text: Option<String>,
    /// Set when neither backend produced a usable transcript
    pub unavailable: bool,
}

impl FusedTranscript {
    fn unavailable(language: Language) -> Self {
        Self {
            text: String::new(),
            language,
            confidence: 0.0,
            provider: String::new(),
            combined_text: None,
            unavailable: true,
        }
    }
}

/// Dual-backend transcription front end
pub struct TranscriptionFuser {
    primary: Arc<dyn SpeechToText>,
    secondary: Arc<dyn SpeechToText>,
    timeout: Duration,
}

impl TranscriptionFuser {
    pub fn new(
        primary: Arc<dyn SpeechToText>,
        secondary: Arc<dyn SpeechToText>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            timeout,
        }
    }

    /// Transcribe `audio` with both backends concurrently and fuse.
    ///
    /// Higher confidence wins; an exact tie keeps the primary backend.
    pub async fn transcribe(&self, audio: &[u8], language: Language) -> FusedTranscript {
        let (primary, secondary) = tokio::join!(
            self.call_backend(&self.primary, audio, language),
            self.call_backend(&self.secondary, audio, language),
        );

        match (primary, secondary) {
            (Some(a), Some(b)) => {
                let combined = if !a.text.is_empty() && !b.text.is_empty() && a.text != b.text {
                    Some(format!("{} | {}", a.text, b.text))
                } else {
                    None
                };
                let selected = if b.confidence > a.confidence { b } else { a };
                FusedTranscript {
                    text: selected.text,
                    language: selected.language,
                    confidence: selected.confidence,
                    provider: selected.provider,
                    combined_text: combined,
                    unavailable: false,
                }
            }
            (Some(only), None) | (None, Some(only)) => FusedTranscript {
                text: only.text,
                language: only.language,
                confidence: only.confidence,
                provider: only.provider,
                combined_text: None,
                unavailable: false,
            },
            (None, None) => {
                tracing::warn!("both transcription backends failed");
                FusedTranscript::unavailable(language)
            }
        }
    }

    async fn call_backend(
        &self,
        backend: &Arc<dyn SpeechToText>,
        audio: &[u8],
        language: Language,
    ) -> Option<Transcription> {
        let tag = backend.provider_tag().to_string();
        match tokio::time::timeout(self.timeout, backend.transcribe(audio, language)).await {
            Ok(Ok(transcript)) => Some(transcript),
            Ok(Err(e)) => {
                tracing::warn!(provider = %tag, error = %e, "transcription backend failed");
                None
            }
            Err(_) => {
                tracing::warn!(provider = %tag, timeout_ms = self.timeout.as_millis() as u64, "transcription backend timed out");
                None
            }
        }
    }
}
