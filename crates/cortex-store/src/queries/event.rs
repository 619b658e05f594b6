//! Parameterized queries backing the Event Store (spec §4.1).
//!
//! Every query here is built with bound parameters, never string
//! interpolation of user-controlled values — the one exception is a chunked
//! `IN (...)` list, whose placeholder count (not its values) is computed
//! from the batch size.

use chrono::{DateTime, Utc};
use cortex_types::domain::{Event, EventType, IndexedFacets};
use cortex_types::SessionId;
use rusqlite::{params, Connection};

use crate::error::{Error, Result};

/// `deleteSessions` rejects batches above this size by chunking (spec
/// §4.1): SQLite's default compiled limit on bound parameters is 999 or
/// 32766 depending on build; 500 stays comfortably under either.
const DELETE_CHUNK_SIZE: usize = 500;

pub fn append(
    conn: &Connection,
    session_id: &SessionId,
    event_type: &EventType,
    payload: &serde_json::Value,
    indexed: &IndexedFacets,
) -> Result<i64> {
    let payload_text = serde_json::to_string(payload)?;
    let timestamp = Utc::now();
    conn.execute(
        "INSERT INTO events (session_id, type, timestamp, payload, category, priority, channel)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session_id.to_string(),
            event_type.as_str(),
            timestamp.to_rfc3339(),
            payload_text,
            indexed.category,
            indexed.priority,
            indexed.channel,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let session_id_text: String = row.get("session_id")?;
    let session_id: SessionId = session_id_text.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, "session_id".into(), rusqlite::types::Type::Text)
    })?;
    let type_text: String = row.get("type")?;
    let timestamp_text: String = row.get("timestamp")?;
    let timestamp: DateTime<Utc> = timestamp_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "timestamp".into(), rusqlite::types::Type::Text))?;
    let payload_text: String = row.get("payload")?;
    let payload: serde_json::Value = serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null);

    Ok(Event {
        id: row.get("id")?,
        session_id,
        event_type: EventType::from_str(&type_text),
        timestamp,
        payload,
        indexed: IndexedFacets {
            category: row.get("category")?,
            priority: row.get("priority")?,
            channel: row.get("channel")?,
        },
    })
}

pub fn get_by_session(conn: &Connection, session_id: &SessionId) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, type, timestamp, payload, category, priority, channel
         FROM events WHERE session_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![session_id.to_string()], row_to_event)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

pub fn create_checkpoint(
    conn: &Connection,
    session_id: &SessionId,
    memory_count: u64,
    description: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO checkpoints (session_id, memory_count, description, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            session_id.to_string(),
            memory_count as i64,
            description,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Returns sessions whose `SESSION_STARTED` event payload has
/// `projectDir == dir` (byte-literal match against a stored normalized
/// absolute path, per spec §4.1).
pub fn find_session_ids_by_project_dir(conn: &Connection, dir: &str) -> Result<Vec<SessionId>> {
    let mut stmt = conn.prepare(
        "SELECT session_id, payload FROM events
         WHERE type = 'SESSION_STARTED'
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        let session_id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        Ok((session_id, payload))
    })?;

    let mut matches = Vec::new();
    for row in rows {
        let (session_id_text, payload_text) = row?;
        let payload: serde_json::Value =
            serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null);
        let project_dir = payload.get("projectDir").and_then(|v| v.as_str());
        if project_dir == Some(dir) {
            if let Ok(id) = session_id_text.parse::<SessionId>() {
                matches.push(id);
            }
        }
    }
    Ok(matches)
}

/// Returns every distinct session id that has at least one event, in
/// ascending first-seen order. Used by the Session Manager to enumerate
/// sessions without a dedicated sessions table (state lives in events).
pub fn list_distinct_session_ids(conn: &Connection) -> Result<Vec<SessionId>> {
    let mut stmt = conn.prepare(
        "SELECT session_id FROM events WHERE type = 'SESSION_STARTED' ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        if let Ok(id) = row?.parse::<SessionId>() {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Removes all events and checkpoints for the listed ids, chunking into
/// batches of `DELETE_CHUNK_SIZE` parameterized `IN (...)` queries.
pub fn delete_sessions(conn: &Connection, ids: &[SessionId]) -> Result<()> {
    if ids.is_empty() {
        return Err(Error::Query("deleteSessions called with empty id list".into()));
    }

    for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
        let in_clause = placeholders.join(", ");
        let id_strings: Vec<String> = chunk.iter().map(ToString::to_string).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            id_strings.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

        conn.execute(
            &format!("DELETE FROM events WHERE session_id IN ({})", in_clause),
            param_refs.as_slice(),
        )?;
        conn.execute(
            &format!("DELETE FROM checkpoints WHERE session_id IN ({})", in_clause),
            param_refs.as_slice(),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    #[test]
    fn append_and_get_by_session_preserves_order() {
        let db = Database::open_in_memory().unwrap();
        let session_id = SessionId::new();
        for i in 0..5 {
            append(
                &db.conn,
                &session_id,
                &EventType::MemorySaved,
                &json!({"n": i}),
                &IndexedFacets::default(),
            )
            .unwrap();
        }
        let events = get_by_session(&db.conn, &session_id).unwrap();
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.payload["n"], i);
        }
    }

    #[test]
    fn find_by_project_dir_matches_byte_literal() {
        let db = Database::open_in_memory().unwrap();
        let session_id = SessionId::new();
        append(
            &db.conn,
            &session_id,
            &EventType::SessionStarted,
            &json!({"projectDir": "/home/user/proj"}),
            &IndexedFacets::default(),
        )
        .unwrap();

        let found = find_session_ids_by_project_dir(&db.conn, "/home/user/proj").unwrap();
        assert_eq!(found, vec![session_id]);

        let not_found = find_session_ids_by_project_dir(&db.conn, "/home/user/other").unwrap();
        assert!(not_found.is_empty());
    }

    #[test]
    fn delete_sessions_removes_events_and_checkpoints() {
        let db = Database::open_in_memory().unwrap();
        let session_id = SessionId::new();
        append(
            &db.conn,
            &session_id,
            &EventType::SessionStarted,
            &json!({}),
            &IndexedFacets::default(),
        )
        .unwrap();
        create_checkpoint(&db.conn, &session_id, 0, None).unwrap();

        delete_sessions(&db.conn, &[session_id]).unwrap();

        assert!(get_by_session(&db.conn, &session_id).unwrap().is_empty());
    }

    #[test]
    fn delete_sessions_rejects_empty_batch() {
        let db = Database::open_in_memory().unwrap();
        assert!(delete_sessions(&db.conn, &[]).is_err());
    }
}
