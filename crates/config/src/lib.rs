//! Configuration management for the call dialog pipeline
//!
//! Supports loading configuration from:
//! - TOML files
//! - Environment variables (CALLFLOW_ prefix)

pub mod settings;

pub use settings::{
    load_settings, CacheConfig, ConversationConfig, DataApiConfig, LanguageConfig,
    PipelineConfig, ServerConfig, Settings, SttProviderKind, TtsProviderKind,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
