//! External NLU classifier trait

use async_trait::async_trait;

use crate::{IntentResult, Language, Result};

/// Optional external intent model.
///
/// When present its result takes precedence over keyword scoring, but the
/// keyword path always remains the reachable fallback.
#[async_trait]
pub trait NluClassifier: Send + Sync + 'static {
    /// Classify an utterance. `Ok(None)` means the model had no opinion and
    /// the keyword heuristic decides.
    async fn classify(&self, text: &str, language: Language) -> Result<Option<IntentResult>>;
}
