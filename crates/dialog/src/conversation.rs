//! Conversation Store
//!
//! Accumulated multi-turn dialog state per session: ordered transcript and
//! response logs, a cross-turn context map, and lifecycle bookkeeping.
//! Context is merged field-wise and never cleared mid-call.

use std::collections::HashMap;

use callflow_core::{EntityMap, Error, Language, ResponseEntry, Result, TranscriptEntry};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Ended,
}

/// One conversation's mutable state
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub caller_number: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub language: Language,
    pub status: ConversationStatus,
    pub context: HashMap<String, Value>,
    pub transcript_log: Vec<TranscriptEntry>,
    pub response_log: Vec<ResponseEntry>,
    pub turn_count: usize,
    pub end_reason: Option<String>,
    pub duration_secs: Option<i64>,
}

/// Aggregates for the operations endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub turn_count: usize,
    pub transcript_entries: usize,
    pub response_entries: usize,
    pub average_transcript_confidence: f32,
    pub intents_seen: Vec<String>,
    pub language: Language,
    pub status: ConversationStatus,
    pub duration_secs: Option<i64>,
}

/// Serialized snapshot for the export endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConversationExport {
    /// Full nested structure
    Structured(Box<Conversation>),
    /// Flat rows, one per transcript/response pair
    Tabular { rows: Vec<ExportRow> },
}

/// Conversation search criteria, all optional
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub caller: Option<String>,
    pub intent: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub turn: usize,
    pub timestamp: DateTime<Utc>,
    pub caller_text: String,
    pub response_text: Option<String>,
    pub intent: Option<String>,
}

/// Shared conversation store
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    max_transcripts: usize,
}

impl ConversationStore {
    pub fn new(max_transcripts: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_transcripts,
        }
    }

    pub fn start(
        &self,
        caller_number: &str,
        session_id: &str,
        language: Language,
    ) -> Conversation {
        let conversation = Conversation {
            conversation_id: uuid::Uuid::new_v4().to_string(),
            caller_number: caller_number.to_string(),
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            language,
            status: ConversationStatus::Active,
            context: HashMap::new(),
            transcript_log: Vec::new(),
            response_log: Vec::new(),
            turn_count: 0,
            end_reason: None,
            duration_secs: None,
        };

        self.conversations
            .write()
            .insert(conversation.conversation_id.clone(), conversation.clone());
        tracing::info!(conversation_id = %conversation.conversation_id, session_id, "conversation started");
        conversation
    }

    fn with_mut<T>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Conversation) -> T,
    ) -> Result<T> {
        let mut conversations = self.conversations.write();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::ConversationNotFound(conversation_id.to_string()))?;
        conversation.last_activity_at = Utc::now();
        Ok(f(conversation))
    }

    /// Append a caller transcript. Trims the log to the configured bound
    /// (oldest first) and counts the turn.
    pub fn append_transcript(
        &self,
        conversation_id: &str,
        text: &str,
        language: Language,
        confidence: f32,
    ) -> Result<()> {
        let max = self.max_transcripts;
        self.with_mut(conversation_id, |c| {
            c.transcript_log
                .push(TranscriptEntry::new(text, language, confidence));
            if c.transcript_log.len() > max {
                let excess = c.transcript_log.len() - max;
                c.transcript_log.drain(..excess);
            }
            c.turn_count += 1;
            c.language = language;
        })
    }

    pub fn append_response(
        &self,
        conversation_id: &str,
        text: &str,
        audio_reference: Option<String>,
        intent: &str,
        entities: EntityMap,
    ) -> Result<()> {
        self.with_mut(conversation_id, |c| {
            let mut entry = ResponseEntry::new(text, intent).with_entities(entities);
            if let Some(reference) = audio_reference {
                entry = entry.with_audio(reference);
            }
            c.response_log.push(entry);
        })
    }

    /// Field-wise merge: new keys added, existing keys overwritten,
    /// untouched keys preserved. Never a full replace.
    pub fn merge_context(
        &self,
        conversation_id: &str,
        patch: HashMap<String, Value>,
    ) -> Result<()> {
        self.with_mut(conversation_id, |c| {
            for (key, value) in patch {
                c.context.insert(key, value);
            }
        })
    }

    pub fn last_transcript(&self, conversation_id: &str) -> Result<Option<TranscriptEntry>> {
        self.get(conversation_id)
            .map(|c| c.transcript_log.last().cloned())
    }

    pub fn context(&self, conversation_id: &str) -> Result<HashMap<String, Value>> {
        self.get(conversation_id).map(|c| c.context)
    }

    pub fn get(&self, conversation_id: &str) -> Result<Conversation> {
        self.conversations
            .read()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Error::ConversationNotFound(conversation_id.to_string()))
    }

    pub fn for_session(&self, session_id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .values()
            .find(|c| c.session_id == session_id)
            .cloned()
    }

    /// End a conversation and record its total duration. Idempotent.
    pub fn end(&self, conversation_id: &str, reason: &str) -> Result<()> {
        self.with_mut(conversation_id, |c| {
            if c.status == ConversationStatus::Ended {
                return;
            }
            c.status = ConversationStatus::Ended;
            c.end_reason = Some(reason.to_string());
            c.duration_secs = Some((Utc::now() - c.created_at).num_seconds());
        })
    }

    pub fn statistics(&self, conversation_id: &str) -> Result<ConversationStats> {
        let c = self.get(conversation_id)?;
        let average = if c.transcript_log.is_empty() {
            0.0
        } else {
            c.transcript_log.iter().map(|t| t.confidence).sum::<f32>()
                / c.transcript_log.len() as f32
        };
        let mut intents_seen: Vec<String> = Vec::new();
        for r in &c.response_log {
            if !intents_seen.iter().any(|i| i == &r.intent) {
                intents_seen.push(r.intent.clone());
            }
        }
        Ok(ConversationStats {
            conversation_id: c.conversation_id,
            turn_count: c.turn_count,
            transcript_entries: c.transcript_log.len(),
            response_entries: c.response_log.len(),
            average_transcript_confidence: average,
            intents_seen,
            language: c.language,
            status: c.status,
            duration_secs: c.duration_secs,
        })
    }

    /// Filter conversations by caller number, intent seen, and transcript
    /// text. Filters combine with AND; an absent filter matches everything.
    pub fn search(&self, filter: &SearchFilter) -> Vec<String> {
        let needle = filter.text.as_deref().map(str::to_lowercase);
        self.conversations
            .read()
            .values()
            .filter(|c| {
                if let Some(caller) = filter.caller.as_deref() {
                    if c.caller_number != caller {
                        return false;
                    }
                }
                if let Some(intent) = filter.intent.as_deref() {
                    if !c.response_log.iter().any(|r| r.intent == intent) {
                        return false;
                    }
                }
                if let Some(needle) = needle.as_deref() {
                    return c
                        .transcript_log
                        .iter()
                        .any(|t| t.text.to_lowercase().contains(needle))
                        || c.response_log
                            .iter()
                            .any(|r| r.text.to_lowercase().contains(needle));
                }
                true
            })
            .map(|c| c.conversation_id.clone())
            .collect()
    }

    pub fn export(&self, conversation_id: &str, format: &str) -> Result<ConversationExport> {
        let c = self.get(conversation_id)?;
        match format {
            "structured" => Ok(ConversationExport::Structured(Box::new(c))),
            "tabular" => {
                let rows = c
                    .transcript_log
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ExportRow {
                        turn: i + 1,
                        timestamp: t.timestamp,
                        caller_text: t.text.clone(),
                        response_text: c.response_log.get(i).map(|r| r.text.clone()),
                        intent: c.response_log.get(i).map(|r| r.intent.clone()),
                    })
                    .collect();
                Ok(ConversationExport::Tabular { rows })
            }
            other => Err(Error::InvalidRequest(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}
