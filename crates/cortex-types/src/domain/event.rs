//! Append-only event types (spec §3, §4.1).
//!
//! `Event` is the unit of record for the Event Store: append-only, never
//! mutated, and replayable in sequence order to rebuild a session's Memory
//! Manager state (invariant 1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Recognized event kinds (spec §4.1). Anything else passes through
/// opaquely — hydration ignores unknown types rather than rejecting them,
/// so forward-compatible producers never break replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    SessionStarted,
    SessionEnded,
    MemorySaved,
    MemoryUpdated,
    MemoryDeleted,
    MemoryRecalled,
    Checkpoint,
    Other(String),
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventType::SessionStarted => "SESSION_STARTED",
            EventType::SessionEnded => "SESSION_ENDED",
            EventType::MemorySaved => "MEMORY_SAVED",
            EventType::MemoryUpdated => "MEMORY_UPDATED",
            EventType::MemoryDeleted => "MEMORY_DELETED",
            EventType::MemoryRecalled => "MEMORY_RECALLED",
            EventType::Checkpoint => "CHECKPOINT",
            EventType::Other(s) => s,
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "SESSION_STARTED" => EventType::SessionStarted,
            "SESSION_ENDED" => EventType::SessionEnded,
            "MEMORY_SAVED" => EventType::MemorySaved,
            "MEMORY_UPDATED" => EventType::MemoryUpdated,
            "MEMORY_DELETED" => EventType::MemoryDeleted,
            "MEMORY_RECALLED" => EventType::MemoryRecalled,
            "CHECKPOINT" => EventType::Checkpoint,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(EventType::from_str(&s))
    }
}

/// Indexed facets carried alongside a payload for cheap server-side
/// filtering without deserializing the full payload (spec §3 `Event`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexedFacets {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically increasing per-store sequence number; also the primary
    /// key used by `getBySession` to recover append order.
    pub id: i64,
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub indexed: IndexedFacets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: SessionId,
    pub memory_count: u64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_as_str_and_from_str() {
        for (kind, s) in [
            (EventType::SessionStarted, "SESSION_STARTED"),
            (EventType::MemorySaved, "MEMORY_SAVED"),
            (EventType::Checkpoint, "CHECKPOINT"),
        ] {
            assert_eq!(kind.as_str(), s);
            assert_eq!(EventType::from_str(s), kind);
        }
    }

    #[test]
    fn unknown_event_type_passes_through_opaquely() {
        let kind = EventType::from_str("SOMETHING_NEW");
        assert_eq!(kind, EventType::Other("SOMETHING_NEW".to_string()));
        assert_eq!(kind.as_str(), "SOMETHING_NEW");
    }
}
