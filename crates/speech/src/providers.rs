//! HTTP clients for the external speech and NLU services
//!
//! Each provider is selected by explicit configuration, never by probing
//! which credentials happen to be set.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use callflow_core::{Error, IntentResult, IntentSource, Language, NluClassifier, Result, SpeechToText, TextToSpeech, Transcription};
use callflow_config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry in the synthesis voice inventory
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Voice {
    pub id: &'static str,
    pub name: &'static str,
    pub gender: &'static str,
    pub locale: &'static str,
    pub language: Language,
}

/// Voices the synthesis service offers, one default per language
pub const VOICE_INVENTORY: &[Voice] = &[
    Voice { id: "Zeina", name: "Zeina", gender: "female", locale: "arb", language: Language::Arabic },
    Voice { id: "Joanna", name: "Joanna", gender: "female", locale: "en-US", language: Language::English },
    Voice { id: "Celine", name: "Céline", gender: "female", locale: "fr-FR", language: Language::French },
    Voice { id: "Conchita", name: "Conchita", gender: "female", locale: "es-ES", language: Language::Spanish },
    Voice { id: "Marlene", name: "Marlene", gender: "female", locale: "de-DE", language: Language::German },
];

/// Default synthesis voice per language
pub fn default_voice(language: Language) -> &'static str {
    match language {
        Language::Arabic => "Zeina",
        Language::English => "Joanna",
        Language::French => "Celine",
        Language::Spanish => "Conchita",
        Language::German => "Marlene",
    }
}

fn build_client(timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))
}

#[derive(Debug, Serialize)]
struct SttRequest<'a> {
    audio: String,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    confidence: f32,
}

/// One external speech-to-text service
pub struct HttpSttProvider {
    client: reqwest::Client,
    url: String,
    tag: String,
}

impl HttpSttProvider {
    pub fn new(url: impl Into<String>, tag: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            url: url.into(),
            tag: tag.into(),
        })
    }
}

#[async_trait]
impl SpeechToText for HttpSttProvider {
    async fn transcribe(&self, audio: &[u8], language: Language) -> Result<Transcription> {
        let request = SttRequest {
            audio: BASE64.encode(audio),
            language: language.code(),
        };

        let response = self
            .client
            .post(format!("{}/transcribe", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("{} transcribe call failed: {e}", self.tag)))?;

        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "{} returned status {}",
                self.tag,
                response.status()
            )));
        }

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("{} returned malformed body: {e}", self.tag)))?;

        let language = body
            .language
            .as_deref()
            .and_then(Language::from_str_loose)
            .unwrap_or(language);

        Ok(Transcription {
            text: body.text,
            language,
            confidence: body.confidence.clamp(0.0, 1.0),
            provider: self.tag.clone(),
        })
    }

    fn provider_tag(&self) -> &str {
        &self.tag
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    markup: &'a str,
    language: &'a str,
    voice_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    audio_reference: String,
}

/// External speech synthesis service
pub struct HttpTtsProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpTtsProvider {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TextToSpeech for HttpTtsProvider {
    async fn synthesize(&self, markup: &str, language: Language, voice_id: &str) -> Result<String> {
        let request = TtsRequest {
            markup,
            language: language.code(),
            voice_id,
        };

        let response = self
            .client
            .post(format!("{}/synthesize", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("tts call failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "tts returned status {}",
                response.status()
            )));
        }

        let body: TtsResponse = response
            .json()
            .await
            .map_err(|e| Error::Synthesis(format!("tts returned malformed body: {e}")))?;

        Ok(body.audio_reference)
    }
}

#[derive(Debug, Serialize)]
struct NluRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct NluResponse {
    intent_name: String,
    confidence: f32,
}

/// Optional external NLU model. Absence of an opinion is `Ok(None)`, which
/// lets the keyword heuristic decide.
pub struct HttpNluProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpNluProvider {
    /// Build from pipeline config; returns None when no NLU URL is set.
    pub fn from_config(config: &PipelineConfig) -> Result<Option<Self>> {
        if config.nlu_url.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            client: build_client(config.provider_timeout_ms)?,
            url: config.nlu_url.clone(),
        }))
    }
}

#[async_trait]
impl NluClassifier for HttpNluProvider {
    async fn classify(&self, text: &str, language: Language) -> Result<Option<IntentResult>> {
        let request = NluRequest {
            text,
            language: language.code(),
        };

        let response = match self
            .client
            .post(format!("{}/classify", self.url))
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                // soft failure, the keyword path covers for the model
                tracing::warn!(error = %e, "external nlu unreachable");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "external nlu rejected request");
            return Ok(None);
        }

        let body: NluResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("nlu returned malformed body: {e}")))?;

        Ok(Some(IntentResult::new(
            &body.intent_name,
            body.confidence,
            IntentSource::ExternalModel,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_voice_covers_every_language() {
        for &language in Language::all() {
            assert!(!default_voice(language).is_empty());
        }
    }

    #[test]
    fn test_every_default_voice_is_in_the_inventory() {
        for &language in Language::all() {
            let id = default_voice(language);
            assert!(VOICE_INVENTORY
                .iter()
                .any(|v| v.id == id && v.language == language));
        }
    }

    #[test]
    fn test_nlu_disabled_when_url_empty() {
        let config = PipelineConfig::default();
        assert!(HttpNluProvider::from_config(&config)
            .map(|p| p.is_none())
            .unwrap_or(false));
    }
}
