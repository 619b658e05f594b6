//! Session lifecycle types (spec §3, §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// `(none) -> start -> active -> end -> ended`, with `abandoned` as an
/// additional terminal reached for unclean shutdowns detected on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
    Abandoned,
}

impl SessionStatus {
    /// Terminal statuses never transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: Option<String>,
    pub project_dir: Option<String>,
    pub default_channel: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub memory_count: u64,
}

impl Session {
    #[must_use]
    pub fn start(
        name: Option<String>,
        project_dir: Option<String>,
        default_channel: Option<String>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            name,
            project_dir,
            default_channel,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            memory_count: 0,
        }
    }
}

/// Filter accepted by `listSessions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active_with_zero_memories() {
        let s = Session::start(Some("demo".into()), None, None);
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.memory_count, 0);
        assert!(s.ended_at.is_none());
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Ended.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
    }
}
