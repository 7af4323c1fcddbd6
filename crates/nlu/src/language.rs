//! Language Resolution
//!
//! Scores text against per-language character signatures and reconciles the
//! result with an optional audio-derived guess. Detection never fails: empty
//! or unrecognizable input falls back to the configured default language.

use callflow_core::Language;
use unicode_segmentation::UnicodeSegmentation;

use crate::length_adjusted;

/// One candidate language with its score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanguageGuess {
    pub language: Language,
    pub confidence: f32,
}

/// Signature-based language detector
pub struct LanguageResolver {
    default_language: Language,
}

impl LanguageResolver {
    pub fn new(default_language: Language) -> Self {
        Self { default_language }
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Detect the language of a text sample.
    ///
    /// The fraction of non-whitespace characters matching each language's
    /// signature is length-adjusted and the best score wins. Ties resolve to
    /// the earliest language in the fixed priority ordering. A zero score
    /// falls closed to the default language with confidence 0.
    pub fn detect(&self, text: &str) -> LanguageGuess {
        let sample: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if sample.is_empty() {
            return LanguageGuess {
                language: self.default_language,
                confidence: 0.0,
            };
        }

        let char_count = text.graphemes(true).count();
        let mut best = LanguageGuess {
            language: self.default_language,
            confidence: 0.0,
        };

        for &language in Language::all() {
            let matches = sample.iter().filter(|c| language.signature_matches(**c)).count();
            let ratio = matches as f32 / sample.len() as f32;
            let score = length_adjusted(ratio, char_count);

            // strict comparison keeps the priority-order winner on ties
            if score > best.confidence {
                best = LanguageGuess {
                    language,
                    confidence: score,
                };
            }
        }

        if best.confidence == 0.0 {
            tracing::debug!(sample_len = sample.len(), "no language signature matched, using default");
            best.language = self.default_language;
        }

        best
    }

    /// Reconcile a text-derived guess with an audio-derived one.
    ///
    /// The higher confidence wins; an exact tie favors the audio result
    /// since the acoustic model saw the raw signal.
    pub fn detect_with_audio(&self, text: &str, audio: Option<LanguageGuess>) -> LanguageGuess {
        let from_text = self.detect(text);
        match audio {
            Some(from_audio) if from_audio.confidence >= from_text.confidence => from_audio,
            _ => from_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> LanguageResolver {
        LanguageResolver::new(Language::Arabic)
    }

    #[test]
    fn test_empty_text_falls_back_to_default() {
        let guess = resolver().detect("");
        assert_eq!(guess.language, Language::Arabic);
        assert_eq!(guess.confidence, 0.0);
    }

    #[test]
    fn test_whitespace_only_falls_back_to_default() {
        let guess = resolver().detect("   \t\n  ");
        assert_eq!(guess.language, Language::Arabic);
        assert_eq!(guess.confidence, 0.0);
    }

    #[test]
    fn test_arabic_text_detected() {
        let guess = resolver().detect("مرحبا كيف حالك اليوم يا صديقي العزيز");
        assert_eq!(guess.language, Language::Arabic);
        assert!(guess.confidence > 0.5);
    }

    #[test]
    fn test_latin_ascii_tie_goes_to_english() {
        // plain ASCII matches every Latin signature equally; English sits
        // first among them in the priority ordering
        let guess = resolver().detect("where is my package right now please");
        assert_eq!(guess.language, Language::English);
    }

    #[test]
    fn test_accented_french_beats_english() {
        let guess = resolver().detect("où est mon colis déjà expédié précédemment");
        assert_eq!(guess.language, Language::French);
    }

    #[test]
    fn test_short_text_down_weighted() {
        let short = resolver().detect("hi");
        let long = resolver().detect("hello there how are you doing today friend");
        assert!(short.confidence < long.confidence);
    }

    #[test]
    fn test_audio_wins_on_tie() {
        let r = resolver();
        let text_guess = r.detect("hello there the weather is lovely");
        let audio = LanguageGuess {
            language: Language::German,
            confidence: text_guess.confidence,
        };
        let fused = r.detect_with_audio("hello there the weather is lovely", Some(audio));
        assert_eq!(fused.language, Language::German);
    }

    #[test]
    fn test_higher_text_confidence_beats_audio() {
        let r = resolver();
        let audio = LanguageGuess {
            language: Language::Spanish,
            confidence: 0.1,
        };
        let fused = r.detect_with_audio("مرحبا كيف حالك اليوم يا صديقي العزيز", Some(audio));
        assert_eq!(fused.language, Language::Arabic);
    }
}
