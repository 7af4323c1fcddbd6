//! Turn Processing
//!
//! Drives one caller-utterance to system-response cycle: transcription
//! fusion, language resolution, intent classification, entity extraction,
//! the missing-entity gate, the data query, composition, and synthesis.
//! Turns for the same session serialize on the session's turn lock; turns
//! for different sessions never wait on each other.

use std::sync::Arc;
use std::time::Duration;

use callflow_core::{
    EntityMap, Error, IntentResult, Language, NluClassifier, Result, TextToSpeech,
};
use callflow_data::DataQueryGateway;
use callflow_nlu::{EntityExtractor, IntentCatalog, LanguageResolver};
use callflow_speech::{default_voice, FusedTranscript, TranscriptionFuser};
use serde::Serialize;
use serde_json::{json, Value};

use crate::compose::{ComposeInput, ResponseComposer};
use crate::conversation::ConversationStore;
use crate::session::SessionRegistry;

const PREVIOUS_INTENT_KEY: &str = "previous_intent";

/// One inbound caller turn
pub struct TurnInput {
    pub call_id: String,
    pub audio: Vec<u8>,
}

/// What one turn produced
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub conversation_id: String,
    pub transcript: String,
    pub response_text: String,
    pub response_markup: String,
    pub audio_reference: Option<String>,
    pub language: Language,
    pub intent: String,
    pub intent_confidence: f32,
    /// True when the reply asks for missing entities instead of completing
    pub clarification: bool,
    /// True when this turn ended the call (goodbye)
    pub call_ended: bool,
}

/// Orchestrates the full pipeline for each turn
pub struct DialogEngine {
    sessions: Arc<SessionRegistry>,
    conversations: Arc<ConversationStore>,
    fuser: TranscriptionFuser,
    resolver: LanguageResolver,
    intents: IntentCatalog,
    extractor: EntityExtractor,
    nlu: Option<Arc<dyn NluClassifier>>,
    gateway: Arc<DataQueryGateway>,
    tts: Arc<dyn TextToSpeech>,
    composer: ResponseComposer,
    provider_timeout: Duration,
}

impl DialogEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionRegistry>,
        conversations: Arc<ConversationStore>,
        fuser: TranscriptionFuser,
        resolver: LanguageResolver,
        nlu: Option<Arc<dyn NluClassifier>>,
        gateway: Arc<DataQueryGateway>,
        tts: Arc<dyn TextToSpeech>,
        composer: ResponseComposer,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            conversations,
            fuser,
            resolver,
            intents: IntentCatalog::new(),
            extractor: EntityExtractor::new(),
            nlu,
            gateway,
            tts,
            composer,
            provider_timeout,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub fn gateway(&self) -> &Arc<DataQueryGateway> {
        &self.gateway
    }

    /// First contact for a call: resolve or create the session and greet
    /// the caller. Webhook re-delivery for a live call is an idempotent
    /// lookup, not a duplicate-session error.
    pub async fn handle_incoming_call(
        &self,
        call_id: &str,
        caller_number: &str,
    ) -> Result<TurnOutcome> {
        let session = match self.sessions.create(call_id, caller_number) {
            Ok(session) => session,
            Err(Error::DuplicateSession(_)) => self.sessions.get_by_call_id(call_id)?,
            Err(e) => return Err(e),
        };

        let conversation = match self.conversations.for_session(&session.session_id) {
            Some(existing) => existing,
            None => self.conversations.start(
                caller_number,
                &session.session_id,
                self.resolver.default_language(),
            ),
        };

        let language = session
            .detected_language
            .read()
            .unwrap_or(self.resolver.default_language());

        let reply = self.composer.compose(&ComposeInput {
            intent: "greeting",
            language,
            data: None,
            error: false,
            missing_entities: &[],
            continuation: false,
        });

        let audio_reference = self.synthesize(&reply.markup, language).await;
        self.conversations.append_response(
            &conversation.conversation_id,
            &reply.text,
            audio_reference.clone(),
            "greeting",
            Default::default(),
        )?;

        metrics::counter!("callflow_calls_total").increment(1);
        Ok(TurnOutcome {
            session_id: session.session_id.clone(),
            conversation_id: conversation.conversation_id,
            transcript: String::new(),
            response_text: reply.text,
            response_markup: reply.markup,
            audio_reference,
            language,
            intent: "greeting".to_string(),
            intent_confidence: 1.0,
            clarification: false,
            call_ended: false,
        })
    }

    /// Process one caller utterance end to end
    pub async fn process_turn(&self, input: TurnInput) -> Result<TurnOutcome> {
        let session = self.sessions.get_by_call_id(&input.call_id)?;
        // one turn at a time per session
        let _turn = session.turn_lock.lock().await;

        if !session.is_active() {
            return Err(Error::SessionNotFound(input.call_id.clone()));
        }
        self.sessions.touch(&session.session_id)?;

        let conversation = match self.conversations.for_session(&session.session_id) {
            Some(existing) => existing,
            None => self.conversations.start(
                &session.caller_number,
                &session.session_id,
                self.resolver.default_language(),
            ),
        };
        let conversation_id = conversation.conversation_id.clone();
        let continuation = self
            .conversations
            .last_transcript(&conversation_id)?
            .is_some();

        let hint = session
            .detected_language
            .read()
            .unwrap_or(self.resolver.default_language());
        let fused = self.fuser.transcribe(&input.audio, hint).await;

        if fused.unavailable {
            metrics::counter!("callflow_turns_failed_total", "stage" => "transcription").increment(1);
            return self
                .apology(&session.session_id, &conversation_id, &fused, hint, continuation)
                .await;
        }

        // the backend echoing back the requested language carries no new
        // signal; only a disagreeing detection counts as an audio guess
        let audio_guess = (fused.language != hint).then(|| callflow_nlu::LanguageGuess {
            language: fused.language,
            confidence: fused.confidence,
        });
        let guess = self.resolver.detect_with_audio(&fused.text, audio_guess);
        let language = guess.language;
        session.set_language(language);

        self.conversations.append_transcript(
            &conversation_id,
            &fused.text,
            language,
            fused.confidence,
        )?;

        let context = self.conversations.context(&conversation_id)?;
        let prior_intent = context
            .get(PREVIOUS_INTENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);

        let intent = self
            .classify(&fused.text, language, prior_intent.as_deref())
            .await;
        let bundle = self.extractor.extract(&fused.text, &intent.intent);

        self.conversations.merge_context(
            &conversation_id,
            [
                (PREVIOUS_INTENT_KEY.to_string(), json!(intent.intent)),
                ("language".to_string(), json!(language.code())),
            ]
            .into(),
        )?;

        // clarification turn: ask for what is still missing and stop here
        if !bundle.is_complete() {
            let missing = bundle.missing_list();
            return self
                .clarification_turn(
                    &session.session_id,
                    conversation_id,
                    fused.text,
                    &intent,
                    bundle.entities,
                    &missing,
                    language,
                    continuation,
                )
                .await;
        }

        let call_ended = intent.intent == "goodbye";
        let needs_query = callflow_data::query::definition_for(&intent.intent).is_some();

        let (data, error) = if needs_query {
            match self.gateway.query(&intent.intent, &bundle.entities).await {
                Ok(data) => (Some(data), false),
                // the gateway is the authoritative gate; if it finds a gap the
                // extractor missed, the caller still hears a clarification
                Err(Error::MissingEntities(missing)) => {
                    return self
                        .clarification_turn(
                            &session.session_id,
                            conversation_id,
                            fused.text,
                            &intent,
                            bundle.entities.clone(),
                            &missing,
                            language,
                            continuation,
                        )
                        .await;
                }
                Err(e) if e.is_caller_apology() => {
                    tracing::warn!(intent = %intent.intent, error = %e, "data query failed");
                    metrics::counter!("callflow_turns_failed_total", "stage" => "query").increment(1);
                    (None, true)
                }
                Err(e) => return Err(e),
            }
        } else {
            (None, false)
        };

        let reply = self.composer.compose(&ComposeInput {
            intent: &intent.intent,
            language,
            data: data.as_ref(),
            error,
            missing_entities: &[],
            continuation,
        });

        let audio_reference = self.synthesize(&reply.markup, language).await;
        self.conversations.append_response(
            &conversation_id,
            &reply.text,
            audio_reference.clone(),
            &intent.intent,
            bundle.entities,
        )?;

        if call_ended {
            self.sessions.end(&session.session_id, "completed")?;
            self.conversations.end(&conversation_id, "completed")?;
        }

        metrics::counter!("callflow_turns_total").increment(1);
        Ok(TurnOutcome {
            session_id: session.session_id.clone(),
            conversation_id,
            transcript: fused.text,
            response_text: reply.text,
            response_markup: reply.markup,
            audio_reference,
            language,
            intent: intent.intent,
            intent_confidence: intent.confidence,
            clarification: false,
            call_ended,
        })
    }

    /// Caller hung up mid-call. Idempotent; in-flight work for the turn is
    /// abandoned by its task, never awaited here.
    pub fn handle_hangup(&self, call_id: &str) -> Result<()> {
        let session = self.sessions.get_by_call_id(call_id)?;
        self.sessions.end(&session.session_id, "caller-hangup")?;
        if let Some(conversation) = self.conversations.for_session(&session.session_id) {
            self.conversations
                .end(&conversation.conversation_id, "caller-hangup")?;
        }
        Ok(())
    }

    /// External model first, keyword heuristic as the always-available
    /// fallback; repetition of the prior turn's intent boosts confidence.
    async fn classify(
        &self,
        text: &str,
        language: Language,
        prior_intent: Option<&str>,
    ) -> IntentResult {
        let external = match &self.nlu {
            Some(nlu) => {
                match tokio::time::timeout(self.provider_timeout, nlu.classify(text, language))
                    .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "external nlu failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("external nlu timed out");
                        None
                    }
                }
            }
            None => None,
        };

        let result = external.unwrap_or_else(|| self.intents.classify(text, language));
        self.intents.boost_for_repetition(result, prior_intent)
    }

    async fn synthesize(&self, markup: &str, language: Language) -> Option<String> {
        let voice = default_voice(language);
        match tokio::time::timeout(
            self.provider_timeout,
            self.tts.synthesize(markup, language, voice),
        )
        .await
        {
            Ok(Ok(reference)) => Some(reference),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "synthesis failed");
                None
            }
            Err(_) => {
                tracing::warn!("synthesis timed out");
                None
            }
        }
    }

    /// Ask the caller for the entities still required, ending the turn
    #[allow(clippy::too_many_arguments)]
    async fn clarification_turn(
        &self,
        session_id: &str,
        conversation_id: String,
        transcript: String,
        intent: &IntentResult,
        entities: EntityMap,
        missing: &[String],
        language: Language,
        continuation: bool,
    ) -> Result<TurnOutcome> {
        let reply = self.composer.compose(&ComposeInput {
            intent: &intent.intent,
            language,
            data: None,
            error: false,
            missing_entities: missing,
            continuation,
        });
        let audio_reference = self.synthesize(&reply.markup, language).await;
        self.conversations.append_response(
            &conversation_id,
            &reply.text,
            audio_reference.clone(),
            &intent.intent,
            entities,
        )?;
        metrics::counter!("callflow_clarification_turns_total").increment(1);
        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            conversation_id,
            transcript,
            response_text: reply.text,
            response_markup: reply.markup,
            audio_reference,
            language,
            intent: intent.intent.clone(),
            intent_confidence: intent.confidence,
            clarification: true,
            call_ended: false,
        })
    }

    /// Both transcription backends failed: spoken apology, no transcript
    async fn apology(
        &self,
        session_id: &str,
        conversation_id: &str,
        fused: &FusedTranscript,
        language: Language,
        continuation: bool,
    ) -> Result<TurnOutcome> {
        let reply = self.composer.compose(&ComposeInput {
            intent: "error",
            language,
            data: None,
            error: true,
            missing_entities: &[],
            continuation,
        });
        let audio_reference = self.synthesize(&reply.markup, language).await;
        self.conversations.append_response(
            conversation_id,
            &reply.text,
            audio_reference.clone(),
            "error",
            Default::default(),
        )?;

        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            conversation_id: conversation_id.to_string(),
            transcript: fused.text.clone(),
            response_text: reply.text,
            response_markup: reply.markup,
            audio_reference,
            language,
            intent: "error".to_string(),
            intent_confidence: 0.0,
            clarification: false,
            call_ended: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use callflow_core::{
        DataBackend, DataQueryFailure, QueryMethod, SpeechToText, Transcription,
    };
    use serde_json::Map;

    struct ScriptedStt {
        tag: &'static str,
        text: &'static str,
        confidence: f32,
    }

    #[async_trait]
    impl SpeechToText for ScriptedStt {
        async fn transcribe(&self, _audio: &[u8], language: Language) -> Result<Transcription> {
            if self.text.is_empty() {
                return Err(Error::TranscriptionUnavailable);
            }
            Ok(Transcription {
                text: self.text.to_string(),
                language,
                confidence: self.confidence,
                provider: self.tag.to_string(),
            })
        }

        fn provider_tag(&self) -> &str {
            self.tag
        }
    }

    struct StubBackend;

    #[async_trait]
    impl DataBackend for StubBackend {
        async fn execute(
            &self,
            _method: QueryMethod,
            _url: &str,
            _params: &Map<String, Value>,
        ) -> std::result::Result<Map<String, Value>, DataQueryFailure> {
            let mut body = Map::new();
            body.insert(
                "current_status".to_string(),
                Value::String("in transit".to_string()),
            );
            body.insert(
                "estimated_delivery".to_string(),
                Value::String("Monday".to_string()),
            );
            Ok(body)
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl DataBackend for FailingBackend {
        async fn execute(
            &self,
            _method: QueryMethod,
            _url: &str,
            _params: &Map<String, Value>,
        ) -> std::result::Result<Map<String, Value>, DataQueryFailure> {
            Err(DataQueryFailure::Status {
                status: 503,
                detail: "down".to_string(),
            })
        }
    }

    struct StubTts;

    #[async_trait]
    impl TextToSpeech for StubTts {
        async fn synthesize(
            &self,
            _markup: &str,
            _language: Language,
            _voice_id: &str,
        ) -> Result<String> {
            Ok("audio://reply".to_string())
        }
    }

    fn engine_with(utterance: &'static str, backend: Arc<dyn DataBackend>) -> DialogEngine {
        let sessions = Arc::new(SessionRegistry::new(
            Duration::from_secs(3600),
            Duration::from_secs(300),
        ));
        let conversations = Arc::new(ConversationStore::new(50));
        let fuser = TranscriptionFuser::new(
            Arc::new(ScriptedStt {
                tag: "cloud_speech",
                text: utterance,
                confidence: 0.9,
            }),
            Arc::new(ScriptedStt {
                tag: "whisper",
                text: utterance,
                confidence: 0.6,
            }),
            Duration::from_millis(500),
        );
        DialogEngine::new(
            sessions,
            conversations,
            fuser,
            LanguageResolver::new(Language::Arabic),
            None,
            Arc::new(DataQueryGateway::new(backend, Duration::from_secs(60))),
            Arc::new(StubTts),
            ResponseComposer::with_seed(Language::Arabic, 11),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_full_turn_with_data_query() {
        let engine = engine_with("track shipment ab12345 please", Arc::new(StubBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        let outcome = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.intent, "shipment_inquiry");
        assert!(!outcome.clarification);
        assert!(outcome.response_text.contains("in transit"));
        assert_eq!(outcome.audio_reference.as_deref(), Some("audio://reply"));
        assert_eq!(outcome.language, Language::English);
    }

    #[tokio::test]
    async fn test_missing_entities_trigger_clarification() {
        let engine = engine_with("i want to book appointment", Arc::new(StubBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        let outcome = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.intent, "appointment_booking");
        assert!(outcome.clarification);
        assert!(outcome.response_text.contains("date"));
        assert!(outcome.response_text.contains("time"));
        assert!(outcome.response_text.contains("service_type"));
    }

    #[tokio::test]
    async fn test_data_outage_becomes_spoken_apology() {
        let engine = engine_with("track shipment ab12345 please", Arc::new(FailingBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        let outcome = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();

        // typed failure surfaces as a composed apology, not an error
        assert!(outcome.response_text.starts_with("Sorry"));
        assert!(!outcome.clarification);
    }

    #[tokio::test]
    async fn test_goodbye_ends_the_call() {
        let engine = engine_with("goodbye and thank you", Arc::new(StubBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        let outcome = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.intent, "goodbye");
        assert!(outcome.call_ended);
        let session = engine.sessions().get_by_call_id("call-1").unwrap();
        assert!(!session.is_active());
        assert_eq!(session.end_reason.read().as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn test_webhook_redelivery_is_idempotent() {
        let engine = engine_with("hello", Arc::new(StubBackend));
        let first = engine.handle_incoming_call("call-1", "+111").await.unwrap();
        let second = engine.handle_incoming_call("call-1", "+111").await.unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.conversation_id, second.conversation_id);
    }

    #[tokio::test]
    async fn test_hangup_is_idempotent() {
        let engine = engine_with("hello there", Arc::new(StubBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        engine.handle_hangup("call-1").unwrap();
        engine.handle_hangup("call-1").unwrap();

        let session = engine.sessions().get_by_call_id("call-1").unwrap();
        assert_eq!(session.end_reason.read().as_deref(), Some("caller-hangup"));
    }

    #[tokio::test]
    async fn test_repeated_intent_boosts_confidence() {
        let engine = engine_with("track shipment ab12345 please", Arc::new(StubBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        let first = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();
        let second = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(first.intent, second.intent);
        assert!(second.intent_confidence > first.intent_confidence);
        assert!((second.intent_confidence - (first.intent_confidence * 1.2).min(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_gateway_requirements_match_the_extractor_table() {
        // both gates read from their own table; a drifted entry would turn a
        // clarification into a raw 400 at the webhook
        for intent in callflow_data::query::queryable_intents() {
            let def = callflow_data::query::definition_for(intent).unwrap();
            assert_eq!(
                callflow_nlu::required_entities(intent),
                def.required_params,
                "required entities for {intent} disagree with the query definition",
            );
        }
    }

    #[tokio::test]
    async fn test_both_backends_failing_yields_apology_turn() {
        // empty scripted text makes both backends error out
        let engine = engine_with("", Arc::new(StubBackend));
        engine.handle_incoming_call("call-1", "+111").await.unwrap();

        let outcome = engine
            .process_turn(TurnInput {
                call_id: "call-1".to_string(),
                audio: b"pcm".to_vec(),
            })
            .await
            .unwrap();

        assert!(outcome.transcript.is_empty());
        assert_eq!(outcome.intent, "error");
        assert!(!outcome.response_text.is_empty());
    }
}
