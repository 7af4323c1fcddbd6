//! Entity Extraction
//!
//! Regex pattern tables compiled once at startup. Extraction always returns
//! a full bundle: whatever matched plus the set of entity types the intent
//! still requires. A failed specialized pattern never discards the rest.

use callflow_core::{entity_value_present, EntityBundle, EntityMap};
use once_cell::sync::Lazy;
use regex::Regex;

/// A compiled extraction rule
struct EntityPattern {
    entity_type: &'static str,
    regex: Regex,
    description: &'static str,
}

fn pattern(entity_type: &'static str, source: &str, description: &'static str) -> EntityPattern {
    // the table is static, a bad pattern is a programming error caught by tests
    EntityPattern {
        entity_type,
        regex: Regex::new(source).unwrap_or_else(|e| panic!("bad {entity_type} pattern: {e}")),
        description,
    }
}

static PATTERNS: Lazy<Vec<EntityPattern>> = Lazy::new(|| {
    vec![
        pattern("number", r"\b\d+(?:\.\d+)?\b", "numeric value"),
        pattern(
            "phone_number",
            r"\b(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            "phone number",
        ),
        pattern(
            "date",
            r"\b\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b|\b\d{1,2}\s+(?:يناير|فبراير|مارس|أبريل|مايو|يونيو|يوليو|أغسطس|سبتمبر|أكتوبر|نوفمبر|ديسمبر)\s+\d{4}\b",
            "calendar date",
        ),
        pattern("time", r"\b\d{1,2}:\d{2}(?:\s*(?:ص|م|am|pm))?\b", "time of day"),
        pattern(
            "service_type",
            r"\b(?:checkup|consultation|dental|vaccination|معاينة|استشارة|أسنان|تطعيم|consultation générale|consulta|untersuchung)\b",
            "appointment service category",
        ),
        pattern(
            "email",
            r"\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
            "email address",
        ),
        pattern(
            "tracking_id",
            r"\b[a-z]{2,}\d{4,}\b",
            "shipment tracking identifier",
        ),
        pattern("account_id", r"\bacct?\d{4,}\b|\b\d{8,12}\b", "account identifier"),
        pattern(
            "name",
            r"\b[a-z؀-ۿ]{3,}\b",
            "personal name candidate",
        ),
        pattern(
            "location",
            r"\b[a-z؀-ۿ]+(?:\s+[a-z؀-ۿ]+)+\b",
            "place reference",
        ),
    ]
});

// separators that carry entity structure (dates, times, phones, emails)
// survive cleaning; everything else non-word becomes a space
static PUNCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\w\s؀-ۿ@.:/+-]").unwrap_or_else(|e| panic!("bad punct pattern: {e}"))
});
static SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").unwrap_or_else(|e| panic!("bad spaces pattern: {e}")));

/// Strip punctuation outside word and Arabic-script ranges, collapse
/// whitespace, lowercase.
pub fn clean_text(text: &str) -> String {
    let stripped = PUNCT.replace_all(text, " ");
    let collapsed = SPACES.replace_all(&stripped, " ");
    collapsed.trim().to_lowercase()
}

/// Entity types an intent needs before its data query can run
pub fn required_entities(intent: &str) -> &'static [&'static str] {
    match intent {
        "appointment_booking" => &["date", "time", "service_type"],
        "shipment_inquiry" => &["tracking_id"],
        "account_balance" => &["account_id"],
        _ => &[],
    }
}

/// Pattern-table entity extractor
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn entity_description(entity_type: &str) -> Option<&'static str> {
        PATTERNS
            .iter()
            .find(|p| p.entity_type == entity_type)
            .map(|p| p.description)
    }

    /// Extract every entity type found in `text` and compute what the
    /// intent still requires.
    pub fn extract(&self, text: &str, intent: &str) -> EntityBundle {
        let cleaned = clean_text(text);

        let mut entities = EntityMap::new();
        for pat in PATTERNS.iter() {
            let values: Vec<String> = pat
                .regex
                .find_iter(&cleaned)
                .map(|m| m.as_str().to_string())
                .filter(|v| !v.trim().is_empty())
                .collect();
            if !values.is_empty() {
                entities.insert(pat.entity_type.to_string(), values);
            }
        }

        let missing = required_entities(intent)
            .iter()
            .filter(|ty| !entity_value_present(&entities, ty))
            .map(|ty| ty.to_string())
            .collect();

        tracing::debug!(intent, found = entities.len(), "entities extracted");

        EntityBundle {
            entities,
            missing_entities: missing,
        }
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}
