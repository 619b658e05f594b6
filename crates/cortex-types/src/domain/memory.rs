//! Memory record types (spec §3, §4.3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MemoryId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Session,
    Global,
}

impl Default for Privacy {
    fn default() -> Self {
        Privacy::Session
    }
}

pub type Metadata = BTreeMap<String, serde_json::Value>;

/// An embedding vector, kept as `f32` to match typical embedding-provider
/// output and to halve storage relative to `f64`.
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub session_id: SessionId,
    pub key: String,
    pub value: String,
    pub category: Option<String>,
    pub priority: Priority,
    pub privacy: Privacy,
    pub channel: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub embedding: Option<Embedding>,
}

/// Options accepted by `save`/`saveOrUpdate` (spec §4.3). Explicit fields
/// only — unknown keys at the wire boundary are a validation error, not a
/// silently-dropped extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveOptions {
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub privacy: Option<Privacy>,
    pub channel: Option<String>,
    pub metadata: Option<Metadata>,
    pub embedding: Option<Embedding>,
}

/// Partial update accepted by `update` (spec §4.3): only `Some` fields are
/// merged; metadata merge is shallow key-level overwrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryPatch {
    pub value: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub channel: Option<String>,
    pub metadata: Option<Metadata>,
    pub embedding: Option<Embedding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    CreatedAsc,
    CreatedDesc,
    UpdatedAsc,
    UpdatedDesc,
}

/// Query accepted by `recall` (spec §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallQuery {
    pub key: Option<String>,
    pub key_pattern: Option<String>,
    pub category: Option<String>,
    pub channel: Option<String>,
    pub priority: Option<Priority>,
    pub session_id: Option<SessionId>,
    pub sort: Option<SortOrder>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl RecallQuery {
    pub const DEFAULT_LIMIT: usize = 100;

    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    #[must_use]
    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// Statistics returned by `getStats()` (spec §7 hydration-warning policy).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub memory_count: usize,
    pub hydration_warnings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_and_privacy_default_sensibly() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Privacy::default(), Privacy::Session);
    }

    #[test]
    fn recall_query_defaults_limit_to_one_hundred() {
        let q = RecallQuery::default();
        assert_eq!(q.effective_limit(), 100);
        assert_eq!(q.effective_offset(), 0);
    }
}
