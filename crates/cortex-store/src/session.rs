//! Session lifecycle state machine atop the Event Store (spec §4.2).
//!
//! `(none) -> start -> active -> end -> ended`, with a separate
//! `abandoned` terminal reached for unclean shutdowns detected on startup.
//! No dedicated `sessions` table — a session's state is always the replay
//! of its own `SESSION_STARTED`/`SESSION_ENDED`/`SESSION_ABANDONED` events,
//! matching invariant 1's "replaying all events ... must yield the same
//! state" for the Memory Manager.

use chrono::{Duration, Utc};
use cortex_types::domain::{Event, EventType, IndexedFacets, Session, SessionFilter, SessionStatus};
use cortex_types::SessionId;
use serde_json::json;

use crate::error::{Error, Result};
use crate::event_store::EventStore;
use crate::memory::MemoryManager;

/// The opaque, pass-through event type used to mark a session abandoned.
/// Not one of the seven named kinds in spec §4.1, which is why it rides
/// the "additional types pass through opaquely" escape hatch rather than
/// living in `EventType`'s enumerated variants.
const SESSION_ABANDONED: &str = "SESSION_ABANDONED";

#[derive(Debug, Clone, Default)]
pub struct StartSessionOptions {
    pub name: Option<String>,
    pub project_dir: Option<String>,
    pub continue_from: Option<SessionId>,
    pub default_channel: Option<String>,
}

#[derive(Clone)]
pub struct SessionManager {
    store: EventStore,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Starting a session with a live active session elsewhere is allowed —
    /// concurrent sessions are first-class (spec §4.2 Failure). Callers
    /// that want singleton semantics track `currentSessionId` themselves.
    pub fn start_session(&self, opts: StartSessionOptions) -> Result<Session> {
        let session = Session::start(
            opts.name.clone(),
            opts.project_dir.clone(),
            opts.default_channel.clone(),
        );

        let payload = json!({
            "name": opts.name,
            "projectDir": opts.project_dir,
            "defaultChannel": opts.default_channel,
            "continueFrom": opts.continue_from.map(|id| id.to_string()),
        });

        self.store.append(
            &session.id,
            &EventType::SessionStarted,
            &payload,
            &IndexedFacets::default(),
        )?;

        Ok(session)
    }

    /// Idempotent after a terminal state (spec §4.2).
    pub fn end_session(&self, id: &SessionId) -> Result<()> {
        let current = self.get_session(id)?;
        if current.status.is_terminal() {
            return Ok(());
        }
        self.store.append(
            id,
            &EventType::SessionEnded,
            &json!({}),
            &IndexedFacets::default(),
        )?;
        Ok(())
    }

    /// Marks an active session abandoned. Idempotent: a no-op once the
    /// session is already terminal.
    pub fn mark_abandoned(&self, id: &SessionId) -> Result<()> {
        let current = self.get_session(id)?;
        if current.status.is_terminal() {
            return Ok(());
        }
        self.store.append(
            id,
            &EventType::Other(SESSION_ABANDONED.to_string()),
            &json!({}),
            &IndexedFacets::default(),
        )?;
        Ok(())
    }

    /// Detects sessions that look active but have had no event for at
    /// least `idle_for`, marks them abandoned, and returns their ids
    /// (spec §4.2: "abandoned ... for unclean shutdowns detected on
    /// startup").
    pub fn detect_and_mark_abandoned(&self, idle_for: Duration) -> Result<Vec<SessionId>> {
        let now = Utc::now();
        let mut abandoned = Vec::new();
        for id in self.store.list_distinct_session_ids()? {
            let events = self.store.get_by_session(&id)?;
            let Some(session) = derive_session(&id, &events) else {
                continue;
            };
            if session.status != SessionStatus::Active {
                continue;
            }
            let last_event_at = events.last().map_or(session.started_at, |e| e.timestamp);
            if now - last_event_at >= idle_for {
                self.mark_abandoned(&id)?;
                abandoned.push(id);
            }
        }
        Ok(abandoned)
    }

    pub fn get_session(&self, id: &SessionId) -> Result<Session> {
        let events = self.store.get_by_session(id)?;
        let mut session = derive_session(id, &events)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        session.memory_count = MemoryManager::open(self.store.clone(), *id)?.count() as u64;
        Ok(session)
    }

    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for id in self.store.list_distinct_session_ids()? {
            let session = self.get_session(&id)?;
            if filter.status.is_none_or(|s| s == session.status) {
                sessions.push(session);
            }
        }
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }
}

fn derive_session(id: &SessionId, events: &[Event]) -> Option<Session> {
    let started = events
        .iter()
        .find(|e| e.event_type == EventType::SessionStarted)?;

    let name = started
        .payload
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let project_dir = started
        .payload
        .get("projectDir")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let default_channel = started
        .payload
        .get("defaultChannel")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let ended = events.iter().find(|e| e.event_type == EventType::SessionEnded);
    let abandoned = events
        .iter()
        .find(|e| matches!(&e.event_type, EventType::Other(t) if t == SESSION_ABANDONED));

    let (status, ended_at) = match (ended, abandoned) {
        (Some(e), _) => (SessionStatus::Ended, Some(e.timestamp)),
        (None, Some(e)) => (SessionStatus::Abandoned, Some(e.timestamp)),
        (None, None) => (SessionStatus::Active, None),
    };

    Some(Session {
        id: *id,
        name,
        project_dir,
        default_channel,
        status,
        started_at: started.timestamp,
        ended_at,
        memory_count: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_end_is_terminal_and_idempotent() {
        let store = EventStore::open_in_memory().unwrap();
        let manager = SessionManager::new(store);
        let session = manager
            .start_session(StartSessionOptions {
                name: Some("demo".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(manager.get_session(&session.id).unwrap().status, SessionStatus::Active);
        manager.end_session(&session.id).unwrap();
        assert_eq!(manager.get_session(&session.id).unwrap().status, SessionStatus::Ended);
        // Idempotent: ending again does not error or flip state.
        manager.end_session(&session.id).unwrap();
        assert_eq!(manager.get_session(&session.id).unwrap().status, SessionStatus::Ended);
    }

    #[test]
    fn concurrent_sessions_are_allowed() {
        let store = EventStore::open_in_memory().unwrap();
        let manager = SessionManager::new(store);
        let a = manager.start_session(StartSessionOptions::default()).unwrap();
        let b = manager.start_session(StartSessionOptions::default()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(manager.list_sessions(&SessionFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn find_by_project_dir_delegates_to_the_event_store() {
        let store = EventStore::open_in_memory().unwrap();
        let manager = SessionManager::new(store.clone());
        manager
            .start_session(StartSessionOptions {
                project_dir: Some("/proj".into()),
                ..Default::default()
            })
            .unwrap();
        let found = store.find_session_ids_by_project_dir("/proj").unwrap();
        assert_eq!(found.len(), 1);
    }
}
