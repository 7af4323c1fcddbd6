//! Intent Classification
//!
//! Keyword-overlap scoring against a static catalog. An external NLU model
//! may override this at the dialog layer, but keyword scoring is always
//! available as the offline fallback path.

use std::collections::HashMap;

use callflow_core::{IntentResult, IntentSource, Language};
use once_cell::sync::Lazy;
use unicode_segmentation::UnicodeSegmentation;

use crate::{entity::clean_text, length_adjusted};

/// Intent returned when no keyword scores at all. Confidence 0.5 signals
/// "needs clarification", not a hard failure.
pub const DEFAULT_INTENT: &str = "general_inquiry";

const REPETITION_BOOST: f32 = 1.2;

/// One catalog entry
#[derive(Debug, Clone)]
pub struct IntentDefinition {
    pub name: &'static str,
    pub description: &'static str,
    keywords: HashMap<Language, &'static [&'static str]>,
}

impl IntentDefinition {
    fn new(
        name: &'static str,
        description: &'static str,
        keywords: &[(Language, &'static [&'static str])],
    ) -> Self {
        Self {
            name,
            description,
            keywords: keywords.iter().copied().collect(),
        }
    }

    pub fn keywords_for(&self, language: Language) -> Option<&'static [&'static str]> {
        self.keywords.get(&language).copied()
    }
}

static CATALOG: Lazy<Vec<IntentDefinition>> = Lazy::new(|| {
    use Language::*;
    vec![
        IntentDefinition::new(
            "greeting",
            "caller opens the conversation",
            &[
                (Arabic, &["مرحبا", "أهلا", "صباح الخير", "مساء الخير", "أهلا وسهلا"]),
                (English, &["hello", "hi", "hey", "good morning", "good evening"]),
                (French, &["bonjour", "salut", "bonsoir"]),
                (Spanish, &["hola", "buenos días", "buenas tardes"]),
                (German, &["hallo", "guten morgen", "guten abend"]),
            ],
        ),
        IntentDefinition::new(
            "goodbye",
            "caller ends the conversation",
            &[
                (Arabic, &["وداعا", "مع السلامة", "حتى اللقاء"]),
                (English, &["goodbye", "bye", "see you", "farewell"]),
                (French, &["au revoir", "à plus tard"]),
                (Spanish, &["adiós", "hasta luego", "nos vemos"]),
                (German, &["auf wiedersehen", "tschüss", "bis später"]),
            ],
        ),
        IntentDefinition::new(
            "appointment_booking",
            "caller wants to book an appointment",
            &[
                (Arabic, &["حجز موعد", "احجز لي موعد", "مواعيد", "متى يمكنني الحجز"]),
                (English, &["book appointment", "schedule meeting", "when can i book"]),
                (French, &["prendre rendez-vous", "planifier une réunion"]),
                (Spanish, &["cita", "reservar cita", "agendar cita"]),
                (German, &["termin vereinbaren", "termin buchen"]),
            ],
        ),
        IntentDefinition::new(
            "shipment_inquiry",
            "caller asks where a shipment is",
            &[
                (Arabic, &["حالة شحنتي", "تتبع شحنتي", "أين شحنتي", "متابعة شحنة"]),
                (English, &["track shipment", "where is my package", "shipping status"]),
                (French, &["suivre la livraison", "où est mon colis", "statut d'expédition"]),
                (Spanish, &["seguir envío", "dónde está mi paquete", "estado del envío"]),
                (German, &["sendung verfolgen", "wo ist mein paket", "versandstatus"]),
            ],
        ),
        IntentDefinition::new(
            "account_balance",
            "caller asks for their account balance",
            &[
                (Arabic, &["رصيد حسابي", "رصيدي", "حسابي", "رصيدي الحالي"]),
                (English, &["account balance", "my balance", "check balance"]),
                (French, &["solde du compte", "mon solde", "vérifier le solde"]),
                (Spanish, &["saldo de la cuenta", "mi saldo", "verificar saldo"]),
                (German, &["kontostand", "mein kontostand", "kontostand prüfen"]),
            ],
        ),
        IntentDefinition::new(
            "general_inquiry",
            "catch-all informational question",
            &[
                (Arabic, &["ما هو", "ماذا", "كيف", "متى", "أين", "لماذا"]),
                (English, &["what is", "what", "how", "when", "where", "why"]),
                (French, &["quoi", "comment", "quand", "où", "pourquoi"]),
                (Spanish, &["qué", "cómo", "cuándo", "dónde", "por qué"]),
                (German, &["was ist", "was", "wie", "wann", "wo", "warum"]),
            ],
        ),
    ]
});

/// Keyword-overlap intent classifier
pub struct IntentCatalog;

impl IntentCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn intent_names() -> Vec<&'static str> {
        CATALOG.iter().map(|i| i.name).collect()
    }

    pub fn definition(name: &str) -> Option<&'static IntentDefinition> {
        CATALOG.iter().find(|i| i.name == name)
    }

    /// Classify an utterance.
    ///
    /// Scores each intent by `matching keywords / total keywords` for the
    /// given language, length-adjusted the same way detection is. Ties keep
    /// the earlier catalog entry. Zero everywhere means the default intent
    /// at confidence 0.5.
    pub fn classify(&self, text: &str, language: Language) -> IntentResult {
        let cleaned = clean_text(text);
        let char_count = cleaned.graphemes(true).count();

        let mut best: Option<(&'static str, f32)> = None;
        for def in CATALOG.iter() {
            let Some(keywords) = def.keywords_for(language) else {
                continue;
            };
            if keywords.is_empty() {
                continue;
            }
            let matches = keywords.iter().filter(|k| cleaned.contains(&**k)).count();
            let score = length_adjusted(matches as f32 / keywords.len() as f32, char_count);
            match best {
                Some((_, top)) if top >= score => {}
                _ => best = Some((def.name, score)),
            }
        }

        match best {
            Some((name, score)) if score > 0.0 => {
                tracing::debug!(intent = name, confidence = score, "keyword intent resolved");
                IntentResult::new(name, score, IntentSource::KeywordHeuristic)
            }
            _ => IntentResult::new(DEFAULT_INTENT, 0.5, IntentSource::KeywordHeuristic),
        }
    }

    /// Apply the cross-turn repetition boost: repeating the prior turn's
    /// intent multiplies confidence by 1.2, capped at 1.0.
    pub fn boost_for_repetition(
        &self,
        mut result: IntentResult,
        prior_intent: Option<&str>,
    ) -> IntentResult {
        if prior_intent == Some(result.intent.as_str()) {
            result.confidence = (result.confidence * REPETITION_BOOST).min(1.0);
        }
        result
    }
}

impl Default for IntentCatalog {
    fn default() -> Self {
        Self::new()
    }
}
