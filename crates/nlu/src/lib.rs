//! Natural-language understanding: language detection, keyword intent
//! classification, and pattern-based entity extraction.
//!
//! Everything here is synchronous and deterministic. The optional external
//! NLU model lives behind `callflow_core::NluClassifier` and is consulted by
//! the dialog engine, not by this crate.

pub mod entity;
pub mod intent;
pub mod language;

pub use entity::{clean_text, required_entities, EntityExtractor};
pub use intent::{IntentCatalog, IntentDefinition, DEFAULT_INTENT};
pub use language::{LanguageGuess, LanguageResolver};

/// Confidence adjustment shared by language detection and intent scoring.
/// Short samples carry less signal, long ones more.
pub(crate) fn length_adjusted(score: f32, char_count: usize) -> f32 {
    let adjusted = if char_count < MIN_SAMPLE_CHARS {
        score * 0.7
    } else if char_count > MAX_SAMPLE_CHARS {
        score * 1.2
    } else {
        score
    };
    adjusted.clamp(0.0, 1.0)
}

pub(crate) const MIN_SAMPLE_CHARS: usize = 10;
pub(crate) const MAX_SAMPLE_CHARS: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_adjustment_bands() {
        assert_eq!(length_adjusted(0.5, 5), 0.35);
        assert_eq!(length_adjusted(0.5, 50), 0.5);
        assert!((length_adjusted(0.5, 200) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_length_adjustment_caps_at_one() {
        assert_eq!(length_adjusted(0.95, 200), 1.0);
    }
}
