//! Shared dialog types
//!
//! One caller turn produces a `TranscriptEntry`; the system's reply is a
//! `ResponseEntry`. Both are immutable once appended to a conversation.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Language;

/// Extracted entity values, keyed by entity type. Values preserve the order
/// they were found in the utterance.
pub type EntityMap = HashMap<String, Vec<String>>;

/// The single predicate deciding whether an entity type counts as present.
///
/// "Present but empty" (type exists, all values blank) is missing. Both the
/// extractor's missing-entity computation and the query gateway's gate use
/// this, so the two checks can never drift apart.
pub fn entity_value_present(entities: &EntityMap, entity_type: &str) -> bool {
    entities
        .get(entity_type)
        .map(|values| values.iter().any(|v| !v.trim().is_empty()))
        .unwrap_or(false)
}

/// One caller utterance as recorded in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub language: Language,
    /// Fused transcription confidence in [0, 1]
    pub confidence: f32,
}

impl TranscriptEntry {
    pub fn new(text: impl Into<String>, language: Language, confidence: f32) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
            language,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// One system reply as recorded in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// Reference to the synthesized audio, when synthesis succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<String>,
    pub intent: String,
    #[serde(default)]
    pub entities: EntityMap,
}

impl ResponseEntry {
    pub fn new(text: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
            audio_reference: None,
            intent: intent.into(),
            entities: EntityMap::new(),
        }
    }

    pub fn with_audio(mut self, reference: impl Into<String>) -> Self {
        self.audio_reference = Some(reference.into());
        self
    }

    pub fn with_entities(mut self, entities: EntityMap) -> Self {
        self.entities = entities;
        self
    }
}

/// Where an intent decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    ExternalModel,
    KeywordHeuristic,
}

/// A classified caller intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f32,
    pub source: IntentSource,
}

impl IntentResult {
    pub fn new(intent: impl Into<String>, confidence: f32, source: IntentSource) -> Self {
        Self {
            intent: intent.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}

/// Extraction result: everything found, plus what the intent still needs.
///
/// Always populated, even when a pattern or specialized lookup failed along
/// the way; partial results are never discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityBundle {
    pub entities: EntityMap,
    /// Entity types the intent requires but the utterance did not supply.
    /// BTreeSet so clarification prompts list them in a stable order.
    pub missing_entities: BTreeSet<String>,
}

impl EntityBundle {
    /// True when every required entity was satisfied
    pub fn is_complete(&self) -> bool {
        self.missing_entities.is_empty()
    }

    /// Missing entity types in stable order
    pub fn missing_list(&self) -> Vec<String> {
        self.missing_entities.iter().cloned().collect()
    }
}

/// A single backend's transcription of one audio sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: Language,
    pub confidence: f32,
    /// Tag identifying which backend produced this
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_value_present() {
        let mut entities = EntityMap::new();
        entities.insert("date".into(), vec!["12/05/2025".into()]);
        entities.insert("time".into(), vec!["".into(), "  ".into()]);

        assert!(entity_value_present(&entities, "date"));
        // present-but-empty counts as missing
        assert!(!entity_value_present(&entities, "time"));
        assert!(!entity_value_present(&entities, "service_type"));
    }

    #[test]
    fn test_confidence_clamped() {
        let entry = TranscriptEntry::new("hello", Language::English, 1.7);
        assert_eq!(entry.confidence, 1.0);
        let intent = IntentResult::new("greeting", -0.2, IntentSource::KeywordHeuristic);
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn test_bundle_missing_order() {
        let mut bundle = EntityBundle::default();
        bundle.missing_entities.insert("time".into());
        bundle.missing_entities.insert("service_type".into());
        assert!(!bundle.is_complete());
        assert_eq!(bundle.missing_list(), vec!["service_type", "time"]);
    }
}
