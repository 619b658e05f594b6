//! Durable append-only event log (spec §4.1).
//!
//! Wraps the single SQLite connection behind a mutex — it is the pooled
//! "shared resource" of spec §5 — and serializes writers per session with
//! a lock keyed on `SessionId`, matching the locking discipline of §5: "a
//! single writer per session (serialized by a per-session lock keyed on
//! SessionId)".

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cortex_types::domain::{Event, EventType, IndexedFacets};
use cortex_types::SessionId;

use crate::db::Database;
use crate::error::Result;
use crate::queries::event;

#[derive(Clone)]
pub struct EventStore {
    db: Arc<Mutex<Database>>,
    locks: Arc<Mutex<HashMap<SessionId, Arc<Mutex<()>>>>>,
}

impl EventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open(path)?)),
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn lock_for(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("event store lock registry poisoned");
        locks.entry(*session_id).or_default().clone()
    }

    pub fn append(
        &self,
        session_id: &SessionId,
        event_type: &EventType,
        payload: &serde_json::Value,
        indexed: &IndexedFacets,
    ) -> Result<i64> {
        let session_lock = self.lock_for(session_id);
        let _guard = session_lock.lock().expect("per-session lock poisoned");
        let db = self.db.lock().expect("event store database lock poisoned");
        event::append(&db.conn, session_id, event_type, payload, indexed)
    }

    pub fn get_by_session(&self, session_id: &SessionId) -> Result<Vec<Event>> {
        let db = self.db.lock().expect("event store database lock poisoned");
        event::get_by_session(&db.conn, session_id)
    }

    pub fn create_checkpoint(
        &self,
        session_id: &SessionId,
        memory_count: u64,
        description: Option<&str>,
    ) -> Result<()> {
        let session_lock = self.lock_for(session_id);
        let _guard = session_lock.lock().expect("per-session lock poisoned");
        let db = self.db.lock().expect("event store database lock poisoned");
        event::create_checkpoint(&db.conn, session_id, memory_count, description)
    }

    pub fn find_session_ids_by_project_dir(&self, dir: &str) -> Result<Vec<SessionId>> {
        let db = self.db.lock().expect("event store database lock poisoned");
        event::find_session_ids_by_project_dir(&db.conn, dir)
    }

    pub fn list_distinct_session_ids(&self) -> Result<Vec<SessionId>> {
        let db = self.db.lock().expect("event store database lock poisoned");
        event::list_distinct_session_ids(&db.conn)
    }

    /// Two-phase delete (spec §5): callers must have already enumerated the
    /// ids via `find_session_ids_by_project_dir` before calling this, so
    /// locks are never held across the enumeration step.
    pub fn delete_sessions(&self, ids: &[SessionId]) -> Result<()> {
        let db = self.db.lock().expect("event store database lock poisoned");
        event::delete_sessions(&db.conn, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_and_replay_round_trips_through_the_store() {
        let store = EventStore::open_in_memory().unwrap();
        let session_id = SessionId::new();
        store
            .append(
                &session_id,
                &EventType::SessionStarted,
                &json!({}),
                &IndexedFacets::default(),
            )
            .unwrap();
        let events = store.get_by_session(&session_id).unwrap();
        assert_eq!(events.len(), 1);
    }
}
