//! Speech processing traits

use async_trait::async_trait;

use crate::{Language, Result, Transcription};

/// Speech-to-Text interface
///
/// Two independent implementations are fused per turn; a failure in one must
/// not block the other's result.
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe one audio sample in the target language.
    ///
    /// # Arguments
    /// * `audio` - Raw audio bytes for the turn
    /// * `language` - Target language for decoding
    async fn transcribe(&self, audio: &[u8], language: Language) -> Result<Transcription>;

    /// Tag identifying this backend in logs and fusion tie-breaks
    fn provider_tag(&self) -> &str;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize marked-up text to audio.
    ///
    /// # Arguments
    /// * `markup` - Text with prosody/emphasis markup applied
    /// * `language` - Language of the text
    /// * `voice_id` - Provider voice identifier
    ///
    /// # Returns
    /// A reference (URL or handle) to the synthesized audio
    async fn synthesize(&self, markup: &str, language: Language, voice_id: &str)
        -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStt;

    #[async_trait]
    impl SpeechToText for MockStt {
        async fn transcribe(&self, _audio: &[u8], language: Language) -> Result<Transcription> {
            Ok(Transcription {
                text: "test transcription".to_string(),
                language,
                confidence: 0.95,
                provider: self.provider_tag().to_string(),
            })
        }

        fn provider_tag(&self) -> &str {
            "mock-stt"
        }
    }

    #[tokio::test]
    async fn test_mock_transcribe() {
        let stt = MockStt;
        let result = stt.transcribe(&[], Language::Arabic).await.unwrap();
        assert_eq!(result.provider, "mock-stt");
        assert_eq!(result.language, Language::Arabic);
    }
}
