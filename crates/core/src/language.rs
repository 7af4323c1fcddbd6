//! Language definitions for the supported caller languages
//!
//! The pipeline serves Arabic-first telephone traffic with four additional
//! European languages. Arabic is the configured default everywhere a
//! detection fails closed.

use serde::{Deserialize, Serialize};

/// Supported caller languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Arabic,
    English,
    French,
    Spanish,
    German,
}

impl Language {
    /// Get ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Arabic => "ar",
            Self::English => "en",
            Self::French => "fr",
            Self::Spanish => "es",
            Self::German => "de",
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arabic => "Arabic",
            Self::English => "English",
            Self::French => "French",
            Self::Spanish => "Spanish",
            Self::German => "German",
        }
    }

    /// Get script used by this language
    pub fn script(&self) -> Script {
        match self {
            Self::Arabic => Script::Arabic,
            _ => Script::Latin,
        }
    }

    /// Check if this language uses right-to-left script
    pub fn is_rtl(&self) -> bool {
        matches!(self.script(), Script::Arabic)
    }

    /// Check whether a character belongs to this language's signature set.
    ///
    /// The signature is intentionally loose: for Latin-script languages it is
    /// ASCII letters plus the language's accented characters, so French and
    /// Spanish only pull ahead of English when their diacritics appear.
    pub fn signature_matches(&self, c: char) -> bool {
        match self {
            Self::Arabic => Script::Arabic.contains_char(c),
            Self::English => c.is_ascii_alphabetic(),
            Self::French => c.is_ascii_alphabetic() || "àâäéèêëïîôöùûüÿç".contains(c),
            Self::Spanish => c.is_ascii_alphabetic() || "áéíóúüñ¿¡".contains(c),
            Self::German => c.is_ascii_alphabetic() || "äöüß".contains(c),
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "ar" | "ara" | "arabic" => Some(Self::Arabic),
            "en" | "eng" | "english" => Some(Self::English),
            "fr" | "fra" | "french" => Some(Self::French),
            "es" | "spa" | "spanish" => Some(Self::Spanish),
            "de" | "deu" | "ger" | "german" => Some(Self::German),
            _ => None,
        }
    }

    /// All supported languages in detection priority order.
    ///
    /// This order is the deterministic tie-break when two languages score
    /// equally, so it must stay fixed.
    pub fn all() -> &'static [Language] {
        &[
            Self::Arabic,
            Self::English,
            Self::French,
            Self::Spanish,
            Self::German,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Script systems used by the supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    Latin,
    Arabic,
}

impl Script {
    /// Get Unicode range for this script (first block only)
    pub fn unicode_range(&self) -> (u32, u32) {
        match self {
            Self::Latin => (0x0000, 0x007F),
            Self::Arabic => (0x0600, 0x06FF),
        }
    }

    /// Check if a character belongs to this script
    pub fn contains_char(&self, c: char) -> bool {
        let code = c as u32;
        let (start, end) = self.unicode_range();
        code >= start && code <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_code() {
        assert_eq!(Language::Arabic.code(), "ar");
        assert_eq!(Language::English.code(), "en");
        assert_eq!(Language::German.code(), "de");
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!(Language::from_str_loose("ar"), Some(Language::Arabic));
        assert_eq!(Language::from_str_loose("Arabic"), Some(Language::Arabic));
        assert_eq!(Language::from_str_loose("FRENCH"), Some(Language::French));
        assert_eq!(Language::from_str_loose("unknown"), None);
    }

    #[test]
    fn test_signature_matches() {
        assert!(Language::Arabic.signature_matches('م'));
        assert!(!Language::Arabic.signature_matches('m'));
        assert!(Language::English.signature_matches('m'));
        assert!(Language::French.signature_matches('é'));
        assert!(!Language::English.signature_matches('é'));
    }

    #[test]
    fn test_priority_order_starts_with_default() {
        assert_eq!(Language::all()[0], Language::default());
    }

    #[test]
    fn test_script_ranges() {
        assert!(Script::Arabic.contains_char('ش'));
        assert!(!Script::Arabic.contains_char('s'));
        assert!(Language::Arabic.is_rtl());
        assert!(!Language::Spanish.is_rtl());
    }
}
