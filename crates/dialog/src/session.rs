//! Session Registry
//!
//! Maps telephony call identifiers to live session records. A secondary
//! index keeps call-id lookup O(1). The inactivity sweep only flips status
//! to ended; records stay queryable until an explicit purge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callflow_core::{Error, Language, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// One telephony call's live record
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub call_id: String,
    pub caller_number: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: RwLock<DateTime<Utc>>,
    pub detected_language: RwLock<Option<Language>>,
    pub status: RwLock<SessionStatus>,
    pub end_reason: RwLock<Option<String>>,
    /// Serializes turn processing for this session; unrelated sessions
    /// never contend on it
    pub turn_lock: tokio::sync::Mutex<()>,
}

impl Session {
    fn new(call_id: &str, caller_number: &str) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            call_id: call_id.to_string(),
            caller_number: caller_number.to_string(),
            created_at: Utc::now(),
            last_activity_at: RwLock::new(Utc::now()),
            detected_language: RwLock::new(None),
            status: RwLock::new(SessionStatus::Active),
            end_reason: RwLock::new(None),
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.status.read() == SessionStatus::Active
    }

    pub fn set_language(&self, language: Language) {
        *self.detected_language.write() = Some(language);
    }

    /// Serializable snapshot for the HTTP layer
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            call_id: self.call_id.clone(),
            caller_number: self.caller_number.clone(),
            created_at: self.created_at,
            last_activity_at: *self.last_activity_at.read(),
            detected_language: *self.detected_language.read(),
            status: *self.status.read(),
            end_reason: self.end_reason.read().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub call_id: String,
    pub caller_number: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub detected_language: Option<Language>,
    pub status: SessionStatus,
    pub end_reason: Option<String>,
}

/// Shared session registry
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// call_id -> session_id
    call_index: RwLock<HashMap<String, String>>,
    inactivity_timeout: Duration,
    sweep_interval: Duration,
}

impl SessionRegistry {
    pub fn new(inactivity_timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            call_index: RwLock::new(HashMap::new()),
            inactivity_timeout,
            sweep_interval,
        }
    }

    /// Create a session for a call. A call id with an active session is a
    /// hard error; the caller must end the prior session first. Webhook
    /// handling treats re-delivery as an idempotent lookup instead.
    pub fn create(&self, call_id: &str, caller_number: &str) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let mut index = self.call_index.write();

        if let Some(existing_id) = index.get(call_id) {
            if sessions.get(existing_id).map(|s| s.is_active()).unwrap_or(false) {
                return Err(Error::DuplicateSession(call_id.to_string()));
            }
        }

        let session = Arc::new(Session::new(call_id, caller_number));
        index.insert(call_id.to_string(), session.session_id.clone());
        sessions.insert(session.session_id.clone(), session.clone());

        metrics::gauge!("callflow_sessions_active").increment(1.0);
        tracing::info!(session_id = %session.session_id, call_id, "session created");
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    pub fn get_by_call_id(&self, call_id: &str) -> Result<Arc<Session>> {
        let session_id = self
            .call_index
            .read()
            .get(call_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(call_id.to_string()))?;
        self.get(&session_id)
    }

    pub fn touch(&self, session_id: &str) -> Result<()> {
        let session = self.get(session_id)?;
        *session.last_activity_at.write() = Utc::now();
        Ok(())
    }

    /// End a session. Idempotent: ending an ended session keeps the first
    /// end reason.
    pub fn end(&self, session_id: &str, reason: &str) -> Result<()> {
        let session = self.get(session_id)?;
        let mut status = session.status.write();
        if *status == SessionStatus::Ended {
            return Ok(());
        }
        *status = SessionStatus::Ended;
        *session.end_reason.write() = Some(reason.to_string());
        metrics::gauge!("callflow_sessions_active").decrement(1.0);
        tracing::info!(session_id, reason, "session ended");
        Ok(())
    }

    /// End every active session idle longer than `timeout`, returning how
    /// many were ended. Records are never removed here.
    pub fn sweep_inactive(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let stale: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_active())
            .filter(|s| {
                let idle = now - *s.last_activity_at.read();
                idle.num_seconds() > timeout.as_secs() as i64
            })
            .map(|s| s.session_id.clone())
            .collect();

        for session_id in &stale {
            // ignore races with an explicit end between the scan and here
            let _ = self.end(session_id, "timeout");
        }
        stale.len()
    }

    /// Physically remove ended sessions, returning how many were purged
    pub fn purge_ended(&self) -> usize {
        let mut sessions = self.sessions.write();
        let mut index = self.call_index.write();

        let before = sessions.len();
        sessions.retain(|_, s| s.is_active());
        index.retain(|_, session_id| sessions.contains_key(session_id));
        before - sessions.len()
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.read().values().map(|s| s.snapshot()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().values().filter(|s| s.is_active()).count()
    }

    /// Start the periodic inactivity sweep. Returns a shutdown sender.
    pub fn start_sweep_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.sweep_interval;
        let timeout = registry.inactivity_timeout;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let ended = registry.sweep_inactive(timeout);
                        if ended > 0 {
                            tracing::info!(ended, "inactivity sweep ended sessions");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Duration::from_secs(3600), Duration::from_secs(300))
    }

    #[test]
    fn test_create_and_lookup() {
        let reg = registry();
        let session = reg.create("call-1", "+96170123456").unwrap();

        assert!(reg.get(&session.session_id).is_ok());
        let by_call = reg.get_by_call_id("call-1").unwrap();
        assert_eq!(by_call.session_id, session.session_id);
    }

    #[test]
    fn test_duplicate_active_call_id_rejected() {
        let reg = registry();
        reg.create("call-1", "+96170123456").unwrap();
        let err = reg.create("call-1", "+96170123456").unwrap_err();
        assert!(matches!(err, Error::DuplicateSession(_)));
    }

    #[test]
    fn test_ended_call_id_can_be_recreated() {
        let reg = registry();
        let first = reg.create("call-1", "+96170123456").unwrap();
        reg.end(&first.session_id, "completed").unwrap();

        let second = reg.create("call-1", "+96170123456").unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(reg.get_by_call_id("call-1").unwrap().session_id, second.session_id);
    }

    #[test]
    fn test_end_is_idempotent() {
        let reg = registry();
        let session = reg.create("call-1", "+96170123456").unwrap();
        reg.end(&session.session_id, "caller-hangup").unwrap();
        reg.end(&session.session_id, "timeout").unwrap();
        assert_eq!(session.end_reason.read().as_deref(), Some("caller-hangup"));
    }

    #[test]
    fn test_sweep_boundary() {
        let reg = registry();
        let stale = reg.create("call-stale", "+111").unwrap();
        let fresh = reg.create("call-fresh", "+222").unwrap();

        *stale.last_activity_at.write() = Utc::now() - chrono::Duration::seconds(3601);
        *fresh.last_activity_at.write() = Utc::now() - chrono::Duration::seconds(3599);

        let ended = reg.sweep_inactive(Duration::from_secs(3600));
        assert_eq!(ended, 1);
        assert!(!stale.is_active());
        assert!(fresh.is_active());
        assert_eq!(stale.end_reason.read().as_deref(), Some("timeout"));
    }

    #[test]
    fn test_sweep_keeps_records_queryable() {
        let reg = registry();
        let session = reg.create("call-1", "+111").unwrap();
        *session.last_activity_at.write() = Utc::now() - chrono::Duration::seconds(9999);

        reg.sweep_inactive(Duration::from_secs(3600));
        assert!(reg.get(&session.session_id).is_ok());

        assert_eq!(reg.purge_ended(), 1);
        assert!(reg.get(&session.session_id).is_err());
        assert!(reg.get_by_call_id("call-1").is_err());
    }

    #[test]
    fn test_touch_updates_activity() {
        let reg = registry();
        let session = reg.create("call-1", "+111").unwrap();
        *session.last_activity_at.write() = Utc::now() - chrono::Duration::seconds(500);

        reg.touch(&session.session_id).unwrap();
        let idle = Utc::now() - *session.last_activity_at.read();
        assert!(idle.num_seconds() < 2);
    }
}
