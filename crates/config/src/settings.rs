//! Application settings
//!
//! Each section gets serde defaults so a partial file (or none at all) still
//! yields a runnable configuration. Provider choice is explicit here; the
//! pipeline never infers a provider from which credentials happen to exist.

use callflow_core::Language;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub data_api: DataApiConfig,

    #[serde(default)]
    pub language: LanguageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty means localhost-only
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            cors_enabled: true,
        }
    }
}

/// Which STT provider an endpoint slot uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttProviderKind {
    CloudSpeech,
    Whisper,
}

/// Which TTS provider is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProviderKind {
    Polly,
}

/// Turn-processing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Primary STT backend; wins exact-confidence ties in fusion
    #[serde(default = "default_primary_stt")]
    pub primary_stt: SttProviderKind,

    #[serde(default = "default_secondary_stt")]
    pub secondary_stt: SttProviderKind,

    #[serde(default = "default_tts")]
    pub tts: TtsProviderKind,

    /// Base URL of the primary STT service
    #[serde(default = "default_primary_stt_url")]
    pub primary_stt_url: String,

    /// Base URL of the secondary STT service
    #[serde(default = "default_secondary_stt_url")]
    pub secondary_stt_url: String,

    /// Base URL of the TTS service
    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    /// Base URL of the external NLU classifier; empty disables it
    #[serde(default)]
    pub nlu_url: String,

    /// Per-provider call timeout in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

fn default_primary_stt() -> SttProviderKind {
    SttProviderKind::CloudSpeech
}
fn default_secondary_stt() -> SttProviderKind {
    SttProviderKind::Whisper
}
fn default_tts() -> TtsProviderKind {
    TtsProviderKind::Polly
}
fn default_primary_stt_url() -> String {
    "http://127.0.0.1:8090".to_string()
}
fn default_secondary_stt_url() -> String {
    "http://127.0.0.1:8091".to_string()
}
fn default_tts_url() -> String {
    "http://127.0.0.1:8092".to_string()
}
fn default_provider_timeout_ms() -> u64 {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_stt: default_primary_stt(),
            secondary_stt: default_secondary_stt(),
            tts: default_tts(),
            primary_stt_url: default_primary_stt_url(),
            secondary_stt_url: default_secondary_stt_url(),
            tts_url: default_tts_url(),
            nlu_url: String::new(),
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

/// Session and conversation lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Transcript log cap per conversation; oldest entries drop first
    #[serde(default = "default_max_transcripts")]
    pub max_transcripts: usize,

    /// Seconds of inactivity before the sweep ends a session
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// Seconds between sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_transcripts() -> usize {
    50
}
fn default_inactivity_timeout_secs() -> u64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_transcripts: default_max_transcripts(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Query result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// External data backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataApiConfig {
    #[serde(default = "default_data_api_base_url")]
    pub base_url: String,

    /// Bearer token for the data backend
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_data_api_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_data_api_base_url() -> String {
    "https://customer-api.example.com".to_string()
}
fn default_data_api_timeout_secs() -> u64 {
    30
}

impl Default for DataApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_api_base_url(),
            api_key: String::new(),
            timeout_secs: default_data_api_timeout_secs(),
        }
    }
}

/// Language resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Language used whenever detection fails closed. Accepts ISO codes
    /// ("ar") as well as full names ("arabic").
    #[serde(default, deserialize_with = "language_loose")]
    pub default_language: Language,
}

fn language_loose<'de, D>(deserializer: D) -> Result<Language, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Language::from_str_loose(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unsupported language: {raw}")))
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default_language: Language::Arabic,
        }
    }
}

/// Load settings from an optional TOML file, overlaid with `CALLFLOW_*`
/// environment variables (`CALLFLOW_SERVER__PORT=9000` style nesting).
pub fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !std::path::Path::new(path).exists() {
            return Err(ConfigError::FileNotFound(path.to_string()));
        }
        builder = builder.add_source(config::File::with_name(path));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CALLFLOW")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;

    if settings.conversation.max_transcripts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "conversation.max_transcripts".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    tracing::info!(
        port = settings.server.port,
        default_language = %settings.language.default_language,
        "settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.cache.ttl_secs, 3600);
        assert_eq!(settings.conversation.max_transcripts, 50);
        assert_eq!(settings.language.default_language, Language::Arabic);
        assert_eq!(settings.pipeline.primary_stt, SttProviderKind::CloudSpeech);
    }

    #[test]
    fn test_partial_toml_round_trip() {
        let parsed: Settings = toml::from_str(
            r#"
            [server]
            port = 9100

            [cache]
            ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.port, 9100);
        assert_eq!(parsed.cache.ttl_secs, 60);
        // untouched sections keep their defaults
        assert_eq!(parsed.conversation.inactivity_timeout_secs, 3600);
    }

    #[test]
    fn test_language_codes_parse() {
        let parsed: Settings = toml::from_str(
            r#"
            [language]
            default_language = "en"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.language.default_language, Language::English);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_settings(Some("/nonexistent/callflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
