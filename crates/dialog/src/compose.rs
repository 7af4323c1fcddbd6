//! Response Composition
//!
//! Picks a phrasing template for (intent, language), fills named slots from
//! query data, layers in continuity cues, and wraps the result in synthesis
//! markup. Slot filling fails soft: an unresolved placeholder keeps its
//! literal text. Selection among candidates is randomized only when no
//! conversational context disambiguates, and that policy is load-bearing
//! for testability, so the RNG is injected.

use callflow_core::Language;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

/// Everything the composer needs for one reply
pub struct ComposeInput<'a> {
    pub intent: &'a str,
    pub language: Language,
    /// Mapped query result, when the data step ran and succeeded
    pub data: Option<&'a Map<String, Value>>,
    /// Set when the turn failed and the caller gets an apology
    pub error: bool,
    /// Entity types still required; non-empty means a clarification turn
    pub missing_entities: &'a [String],
    /// True when prior transcript history exists for this conversation
    pub continuation: bool,
}

/// Composed reply: plain text plus synthesis markup
#[derive(Debug, Clone)]
pub struct ComposedResponse {
    pub text: String,
    pub markup: String,
}

type TemplateRow = (&'static str, Language, &'static [&'static str]);

/// Phrasing templates. `{slot}` placeholders resolve against the mapped
/// query data.
static TEMPLATES: &[TemplateRow] = &[
    ("greeting", Language::Arabic, &[
        "مرحباً بك! كيف يمكنني مساعدتك اليوم؟",
        "أهلاً وسهلاً! تفضل، كيف أخدمك؟",
    ]),
    ("greeting", Language::English, &[
        "Hello! How can I help you today?",
        "Hi there! What can I do for you?",
    ]),
    ("greeting", Language::French, &[
        "Bonjour! Comment puis-je vous aider aujourd'hui?",
    ]),
    ("greeting", Language::Spanish, &["¡Hola! ¿Cómo puedo ayudarte hoy?"]),
    ("greeting", Language::German, &["Hallo! Wie kann ich Ihnen heute helfen?"]),
    ("goodbye", Language::Arabic, &["مع السلامة! أتمنى لك يوماً سعيداً."]),
    ("goodbye", Language::English, &["Goodbye! Have a great day."]),
    ("goodbye", Language::French, &["Au revoir! Passez une excellente journée."]),
    ("goodbye", Language::Spanish, &["¡Adiós! Que tengas un gran día."]),
    ("goodbye", Language::German, &["Auf Wiedersehen! Einen schönen Tag noch."]),
    ("appointment_booking", Language::Arabic, &[
        "تم حجز موعدك بنجاح. رقم الحجز هو {reference}.",
        "موعدك مؤكد برقم {reference}.",
    ]),
    ("appointment_booking", Language::English, &[
        "Your appointment is booked. Your reference is {reference}.",
        "All set! Appointment confirmed under reference {reference}.",
    ]),
    ("appointment_booking", Language::French, &[
        "Votre rendez-vous est confirmé. Votre référence est {reference}.",
    ]),
    ("shipment_inquiry", Language::Arabic, &[
        "شحنتك حالياً {status}. موعد التسليم المتوقع {eta}.",
        "حالة شحنتك: {status}.",
    ]),
    ("shipment_inquiry", Language::English, &[
        "Your shipment is currently {status}. Estimated delivery: {eta}.",
        "The latest status of your shipment is {status}.",
    ]),
    ("shipment_inquiry", Language::French, &[
        "Votre colis est actuellement {status}. Livraison estimée: {eta}.",
    ]),
    ("account_balance", Language::Arabic, &[
        "رصيد حسابك الحالي هو {balance} {currency}.",
    ]),
    ("account_balance", Language::English, &[
        "Your current account balance is {balance} {currency}.",
    ]),
    ("account_balance", Language::French, &[
        "Le solde actuel de votre compte est de {balance} {currency}.",
    ]),
    ("general_inquiry", Language::Arabic, &["{answer}", "إليك ما وجدته: {answer}"]),
    ("general_inquiry", Language::English, &["{answer}", "Here is what I found: {answer}"]),
    ("general_inquiry", Language::French, &["{answer}", "Voici ce que j'ai trouvé: {answer}"]),
    ("error", Language::Arabic, &[
        "عذراً، حدث خطأ أثناء معالجة طلبك. يرجى المحاولة مرة أخرى.",
    ]),
    ("error", Language::English, &[
        "Sorry, something went wrong while handling your request. Please try again.",
    ]),
    ("error", Language::French, &[
        "Désolé, une erreur s'est produite lors du traitement de votre demande. Veuillez réessayer.",
    ]),
    ("error", Language::Spanish, &[
        "Lo sentimos, ocurrió un error al procesar su solicitud. Inténtelo de nuevo.",
    ]),
    ("error", Language::German, &[
        "Entschuldigung, bei der Bearbeitung Ihrer Anfrage ist ein Fehler aufgetreten. Bitte versuchen Sie es erneut.",
    ]),
    ("clarification", Language::Arabic, &["لإكمال طلبك، أحتاج إلى: {entities}."]),
    ("clarification", Language::English, &[
        "To complete your request, I still need: {entities}.",
    ]),
    ("clarification", Language::French, &[
        "Pour compléter votre demande, il me faut encore: {entities}.",
    ]),
    ("clarification", Language::Spanish, &[
        "Para completar su solicitud, todavía necesito: {entities}.",
    ]),
    ("clarification", Language::German, &[
        "Um Ihre Anfrage abzuschließen, benötige ich noch: {entities}.",
    ]),
];

fn continuity_prefix(language: Language) -> &'static str {
    match language {
        Language::Arabic => "بالعودة إلى حديثنا، ",
        Language::English => "Continuing where we left off, ",
        Language::French => "Pour reprendre notre échange, ",
        Language::Spanish => "Continuando donde lo dejamos, ",
        Language::German => "Um da weiterzumachen, wo wir aufgehört haben, ",
    }
}

fn list_separator(language: Language) -> &'static str {
    match language {
        Language::Arabic => "، ",
        _ => ", ",
    }
}

/// Resolve `{slot}` placeholders against `data`.
///
/// Unresolved placeholders keep their literal text; their names come back
/// in the second element so callers can log the gap.
pub fn fill_slots(template: &str, data: &Map<String, Value>) -> (String, Vec<String>) {
    let mut output = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match data.get(name) {
                    Some(Value::String(s)) => output.push_str(s),
                    Some(other) => output.push_str(&other.to_string()),
                    None => {
                        missing.push(name.to_string());
                        output.push('{');
                        output.push_str(name);
                        output.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // unbalanced brace, keep the tail verbatim
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    (output, missing)
}

/// Wrap composed text for the synthesis backend, emphasizing the first word
pub fn emphasis_markup(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => format!(
            "<speak><emphasis level=\"strong\">{first}</emphasis> {rest}</speak>"
        ),
        None => format!("<speak><emphasis level=\"strong\">{trimmed}</emphasis></speak>"),
    }
}

/// Template-driven reply builder
pub struct ResponseComposer {
    default_language: Language,
    rng: Mutex<SmallRng>,
}

impl ResponseComposer {
    pub fn new(default_language: Language) -> Self {
        Self {
            default_language,
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Fixed seed for deterministic selection in tests
    pub fn with_seed(default_language: Language, seed: u64) -> Self {
        Self {
            default_language,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Candidate templates for (intent, language) with the fixed language
    /// fallback order: requested, then default, then any remaining.
    fn candidates(&self, intent: &str, language: Language) -> Option<&'static [&'static str]> {
        let lookup = |lang: Language| {
            TEMPLATES
                .iter()
                .find(|(name, l, _)| *name == intent && *l == lang)
                .map(|(_, _, templates)| *templates)
        };

        lookup(language)
            .or_else(|| lookup(self.default_language))
            .or_else(|| {
                Language::all()
                    .iter()
                    .find_map(|&lang| lookup(lang))
            })
    }

    fn select<'t>(&self, candidates: &'t [&'static str], continuation: bool) -> &'t str {
        if continuation || candidates.len() == 1 {
            // prior context pins the phrasing for consistency across turns
            candidates[0]
        } else {
            let index = self.rng.lock().gen_range(0..candidates.len());
            candidates[index]
        }
    }

    pub fn compose(&self, input: &ComposeInput<'_>) -> ComposedResponse {
        let text = if input.error {
            self.phrase("error", input.language, input.continuation, &Map::new())
        } else if !input.missing_entities.is_empty() {
            let mut data = Map::new();
            data.insert(
                "entities".to_string(),
                Value::String(input.missing_entities.join(list_separator(input.language))),
            );
            self.phrase("clarification", input.language, input.continuation, &data)
        } else {
            let empty = Map::new();
            let data = input.data.unwrap_or(&empty);
            let base = self.phrase(input.intent, input.language, input.continuation, data);
            if input.continuation {
                format!("{}{}", continuity_prefix(input.language), base)
            } else {
                base
            }
        };

        let markup = emphasis_markup(&text);
        ComposedResponse { text, markup }
    }

    fn phrase(
        &self,
        intent: &str,
        language: Language,
        continuation: bool,
        data: &Map<String, Value>,
    ) -> String {
        let Some(candidates) = self.candidates(intent, language) else {
            // no template anywhere for this intent, reuse the error phrasing
            return self.phrase("error", language, continuation, &Map::new());
        };
        let template = self.select(candidates, continuation);
        let (filled, missing) = fill_slots(template, data);
        if !missing.is_empty() {
            tracing::debug!(intent, ?missing, "template slots unresolved");
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn composer() -> ResponseComposer {
        ResponseComposer::with_seed(Language::Arabic, 7)
    }

    fn data(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_fill_slots_resolves_and_reports_missing() {
        let d = data(&[("status", "in transit")]);
        let (filled, missing) = fill_slots("Your shipment is {status}. ETA: {eta}.", &d);
        assert_eq!(filled, "Your shipment is in transit. ETA: {eta}.");
        assert_eq!(missing, vec!["eta".to_string()]);
    }

    #[test]
    fn test_fill_slots_non_string_value() {
        let mut d = Map::new();
        d.insert("balance".to_string(), json!(120.5));
        let (filled, _) = fill_slots("Balance: {balance}", &d);
        assert_eq!(filled, "Balance: 120.5");
    }

    #[test]
    fn test_emphasis_markup() {
        assert_eq!(
            emphasis_markup("Hello there friend"),
            "<speak><emphasis level=\"strong\">Hello</emphasis> there friend</speak>"
        );
        assert_eq!(
            emphasis_markup("Hi"),
            "<speak><emphasis level=\"strong\">Hi</emphasis></speak>"
        );
    }

    #[test]
    fn test_clarification_lists_exactly_the_missing_entities() {
        let missing = vec!["service_type".to_string(), "time".to_string()];
        let input = ComposeInput {
            intent: "appointment_booking",
            language: Language::English,
            data: None,
            error: false,
            missing_entities: &missing,
            continuation: false,
        };
        let reply = composer().compose(&input);
        assert!(reply.text.contains("service_type, time"));
        assert!(!reply.text.contains("date"));
    }

    #[test]
    fn test_error_phrasing_in_callers_language() {
        let input = ComposeInput {
            intent: "shipment_inquiry",
            language: Language::French,
            data: None,
            error: true,
            missing_entities: &[],
            continuation: false,
        };
        let reply = composer().compose(&input);
        assert!(reply.text.starts_with("Désolé"));
    }

    #[test]
    fn test_language_fallback_to_default() {
        // appointment_booking has no Spanish templates; Arabic is default
        let d = data(&[("reference", "APT-9")]);
        let input = ComposeInput {
            intent: "appointment_booking",
            language: Language::Spanish,
            data: Some(&d),
            error: false,
            missing_entities: &[],
            continuation: true,
        };
        let reply = composer().compose(&input);
        assert!(reply.text.contains("APT-9"));
    }

    #[test]
    fn test_continuation_is_deterministic_and_prefixed() {
        let d = data(&[("status", "in transit"), ("eta", "Monday")]);
        let input = ComposeInput {
            intent: "shipment_inquiry",
            language: Language::English,
            data: Some(&d),
            error: false,
            missing_entities: &[],
            continuation: true,
        };
        let c = composer();
        let first = c.compose(&input);
        let second = c.compose(&input);
        assert_eq!(first.text, second.text);
        assert!(first.text.starts_with("Continuing where we left off, "));
        assert!(first.text.contains("in transit"));
    }

    #[test]
    fn test_random_selection_stays_in_candidate_set() {
        let input = ComposeInput {
            intent: "greeting",
            language: Language::English,
            data: None,
            error: false,
            missing_entities: &[],
            continuation: false,
        };
        let c = composer();
        for _ in 0..20 {
            let reply = c.compose(&input);
            assert!(
                reply.text == "Hello! How can I help you today?"
                    || reply.text == "Hi there! What can I do for you?",
                "unexpected phrasing: {}",
                reply.text
            );
        }
    }

    #[test]
    fn test_markup_wraps_composed_text() {
        let input = ComposeInput {
            intent: "goodbye",
            language: Language::English,
            data: None,
            error: false,
            missing_entities: &[],
            continuation: false,
        };
        let reply = composer().compose(&input);
        assert!(reply.markup.starts_with("<speak><emphasis level=\"strong\">"));
        assert!(reply.markup.ends_with("</speak>"));
    }
}
