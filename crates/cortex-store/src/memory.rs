//! Memory Manager: per-session hydration, writes, and recall (spec §4.3).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use cortex_search::{VectorIndex, VectorSearchOptions};
use cortex_types::domain::{
    Event, EventType, IndexedFacets, Memory, MemoryPatch, MemoryStats, Priority, RecallQuery,
    SaveOptions, SortOrder,
};
use cortex_types::{MemoryId, SessionId};
use regex::Regex;
use serde_json::json;

use crate::error::{Error, Result};
use crate::event_store::EventStore;

/// Hydrated, in-memory state for one session. Per spec §4.3, "A Memory
/// Manager instance is single-writer per session" — callers must not open
/// two instances for the same session concurrently.
pub struct MemoryManager {
    store: EventStore,
    session_id: SessionId,
    memories: HashMap<String, Memory>,
    by_id: HashMap<MemoryId, String>,
    hydration_warnings: u64,
    vector_index: Option<Arc<Mutex<dyn VectorIndex>>>,
}

impl MemoryManager {
    pub fn open(store: EventStore, session_id: SessionId) -> Result<Self> {
        Self::open_with_vector_index(store, session_id, None)
    }

    pub fn open_with_vector_index(
        store: EventStore,
        session_id: SessionId,
        vector_index: Option<Arc<Mutex<dyn VectorIndex>>>,
    ) -> Result<Self> {
        let events = store.get_by_session(&session_id)?;
        let mut manager = Self {
            store,
            session_id,
            memories: HashMap::new(),
            by_id: HashMap::new(),
            hydration_warnings: 0,
            vector_index,
        };

        if let Some(continue_from) = continue_from_id(&events) {
            let prior_events = manager.store.get_by_session(&continue_from)?;
            manager.apply_events(&prior_events);
        }
        manager.apply_events(&events);
        Ok(manager)
    }

    /// Replays events in sequence order, matching invariant 1: "closing
    /// and reopening ... reproduces the same memories map." Malformed
    /// payloads are logged and skipped, never fail the whole hydration
    /// (spec §4.1 Failure semantics, §7 hydration warnings).
    fn apply_events(&mut self, events: &[Event]) {
        for event in events {
            match &event.event_type {
                EventType::MemorySaved => match serde_json::from_value::<Memory>(event.payload.clone())
                {
                    Ok(memory) => {
                        self.by_id.insert(memory.id, memory.key.clone());
                        self.memories.insert(memory.key.clone(), memory);
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %self.session_id, error = %err, "skipping malformed MEMORY_SAVED payload during hydration");
                        self.hydration_warnings += 1;
                    }
                },
                EventType::MemoryUpdated => match serde_json::from_value::<MemoryUpdatePayload>(
                    event.payload.clone(),
                ) {
                    Ok(update) => {
                        if let Some(existing) = self.memories.get_mut(&update.key) {
                            update.merge_into(existing);
                        } else {
                            tracing::warn!(session_id = %self.session_id, key = %update.key, "MEMORY_UPDATED for unknown key during hydration");
                            self.hydration_warnings += 1;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %self.session_id, error = %err, "skipping malformed MEMORY_UPDATED payload during hydration");
                        self.hydration_warnings += 1;
                    }
                },
                EventType::MemoryDeleted => {
                    if let Some(key) = event.payload.get("key").and_then(|v| v.as_str()) {
                        if let Some(memory) = self.memories.remove(key) {
                            self.by_id.remove(&memory.id);
                        }
                    } else {
                        tracing::warn!(session_id = %self.session_id, "skipping malformed MEMORY_DELETED payload during hydration");
                        self.hydration_warnings += 1;
                    }
                }
                // MEMORY_RECALLED is audit-only and never mutates state;
                // every other type (including Checkpoint and unknowns) is
                // ignored by hydration per spec §4.3.
                _ => {}
            }
        }
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn save(&mut self, key: &str, value: &str, opts: SaveOptions) -> Result<Memory> {
        if self.memories.contains_key(key) {
            return Err(Error::MemoryKeyExists(key.to_string()));
        }
        let now = Utc::now();
        let memory = Memory {
            id: MemoryId::new(),
            session_id: self.session_id,
            key: key.to_string(),
            value: value.to_string(),
            category: opts.category,
            priority: opts.priority.unwrap_or_default(),
            privacy: opts.privacy.unwrap_or_default(),
            channel: opts.channel,
            metadata: opts.metadata.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            embedding: opts.embedding,
        };

        let payload = serde_json::to_value(&memory)?;
        let indexed = IndexedFacets {
            category: memory.category.clone(),
            priority: Some(priority_str(memory.priority).to_string()),
            channel: memory.channel.clone(),
        };
        self.store
            .append(&self.session_id, &EventType::MemorySaved, &payload, &indexed)?;

        self.index_embedding(&memory);
        self.by_id.insert(memory.id, memory.key.clone());
        self.memories.insert(memory.key.clone(), memory.clone());
        Ok(memory)
    }

    pub fn save_or_update(&mut self, key: &str, value: &str, opts: SaveOptions) -> Result<Memory> {
        if self.memories.contains_key(key) {
            self.update(
                key,
                MemoryPatch {
                    value: Some(value.to_string()),
                    category: opts.category,
                    priority: opts.priority,
                    channel: opts.channel,
                    metadata: opts.metadata,
                    embedding: opts.embedding,
                },
            )
        } else {
            self.save(key, value, opts)
        }
    }

    pub fn update(&mut self, key: &str, patch: MemoryPatch) -> Result<Memory> {
        if !self.memories.contains_key(key) {
            return Err(Error::MemoryKeyNotFound(key.to_string()));
        }
        let now = Utc::now();
        let payload = serde_json::to_value(MemoryUpdatePayload {
            key: key.to_string(),
            value: patch.value.clone(),
            category: patch.category.clone(),
            priority: patch.priority,
            channel: patch.channel.clone(),
            metadata: patch.metadata.clone(),
            embedding: patch.embedding.clone(),
            updated_at: now,
        })?;

        self.store.append(
            &self.session_id,
            &EventType::MemoryUpdated,
            &payload,
            &IndexedFacets::default(),
        )?;

        let memory = self.memories.get_mut(key).expect("checked above");
        let update = MemoryUpdatePayload {
            key: key.to_string(),
            value: patch.value,
            category: patch.category,
            priority: patch.priority,
            channel: patch.channel,
            metadata: patch.metadata,
            embedding: patch.embedding,
            updated_at: now,
        };
        update.merge_into(memory);
        let updated = memory.clone();
        self.index_embedding(&updated);
        Ok(updated)
    }

    pub fn delete(&mut self, key: &str) -> Result<bool> {
        if !self.memories.contains_key(key) {
            return Ok(false);
        }
        self.store.append(
            &self.session_id,
            &EventType::MemoryDeleted,
            &json!({ "key": key }),
            &IndexedFacets::default(),
        )?;
        if let Some(memory) = self.memories.remove(key) {
            self.by_id.remove(&memory.id);
            if let Some(index) = &self.vector_index {
                index.lock().expect("vector index lock poisoned").remove(&memory.id);
            }
        }
        Ok(true)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Memory> {
        self.memories.get(key)
    }

    #[must_use]
    pub fn get_by_id(&self, id: &MemoryId) -> Option<&Memory> {
        self.by_id.get(id).and_then(|key| self.memories.get(key))
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.memories.contains_key(key)
    }

    #[must_use]
    pub fn list(&self) -> Vec<&Memory> {
        self.memories.values().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.memories.len()
    }

    #[must_use]
    pub fn get_stats(&self) -> MemoryStats {
        MemoryStats {
            memory_count: self.memories.len(),
            hydration_warnings: self.hydration_warnings,
        }
    }

    /// Server-side filter over the cache; always audit-logs via
    /// `MEMORY_RECALLED` and never mutates the returned memories (spec
    /// §4.3).
    pub fn recall(&self, query: &RecallQuery) -> Result<Vec<Memory>> {
        let pattern = query
            .key_pattern
            .as_deref()
            .map(glob_to_regex)
            .transpose()
            .map_err(|e| Error::Query(e.to_string()))?;

        let mut matched: Vec<&Memory> = self
            .memories
            .values()
            .filter(|m| query.key.as_deref().is_none_or(|k| m.key == k))
            .filter(|m| pattern.as_ref().is_none_or(|re| re.is_match(&m.key)))
            .filter(|m| query.category.as_deref().is_none_or(|c| m.category.as_deref() == Some(c)))
            .filter(|m| query.channel.as_deref().is_none_or(|c| m.channel.as_deref() == Some(c)))
            .filter(|m| query.priority.is_none_or(|p| m.priority == p))
            .filter(|m| query.session_id.is_none_or(|s| m.session_id == s))
            .collect();

        match query.sort {
            Some(SortOrder::CreatedAsc) => matched.sort_by_key(|m| m.created_at),
            Some(SortOrder::CreatedDesc) => matched.sort_by_key(|m| std::cmp::Reverse(m.created_at)),
            Some(SortOrder::UpdatedAsc) => matched.sort_by_key(|m| m.updated_at),
            Some(SortOrder::UpdatedDesc) => matched.sort_by_key(|m| std::cmp::Reverse(m.updated_at)),
            None => matched.sort_by_key(|m| m.created_at),
        }

        let page: Vec<Memory> = matched
            .into_iter()
            .skip(query.effective_offset())
            .take(query.effective_limit())
            .cloned()
            .collect();

        self.store.append(
            &self.session_id,
            &EventType::MemoryRecalled,
            &json!({ "matchCount": page.len() }),
            &IndexedFacets::default(),
        )?;

        Ok(page)
    }

    /// Delegates to the Vector Index, filtered to this session, then joins
    /// hits back to in-memory `Memory` records (spec §4.3).
    pub fn semantic_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
        category: Option<String>,
    ) -> Result<Vec<(Memory, f32)>> {
        let Some(index) = &self.vector_index else {
            return Ok(Vec::new());
        };
        let opts = VectorSearchOptions {
            limit,
            threshold,
            session_id: Some(self.session_id),
            category,
        };
        let hits = index
            .lock()
            .expect("vector index lock poisoned")
            .search(&query_embedding.to_vec(), &opts)
            .map_err(|e| Error::Query(e.to_string()))?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| self.get_by_id(&hit.id).map(|m| (m.clone(), hit.similarity)))
            .collect())
    }

    fn index_embedding(&self, memory: &Memory) {
        if let (Some(index), Some(embedding)) = (&self.vector_index, &memory.embedding) {
            let _ = index.lock().expect("vector index lock poisoned").upsert(
                memory.id,
                embedding.clone(),
                Some(self.session_id),
                memory.category.clone(),
            );
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct MemoryUpdatePayload {
    key: String,
    value: Option<String>,
    category: Option<String>,
    priority: Option<Priority>,
    channel: Option<String>,
    metadata: Option<cortex_types::domain::Metadata>,
    embedding: Option<cortex_types::domain::Embedding>,
    updated_at: chrono::DateTime<Utc>,
}

impl MemoryUpdatePayload {
    /// Shallow key-level metadata overwrite; every other field replaces
    /// wholesale when `Some` (spec §4.3 hydration semantics).
    fn merge_into(&self, memory: &mut Memory) {
        if let Some(value) = &self.value {
            memory.value = value.clone();
        }
        if let Some(category) = &self.category {
            memory.category = Some(category.clone());
        }
        if let Some(priority) = self.priority {
            memory.priority = priority;
        }
        if let Some(channel) = &self.channel {
            memory.channel = Some(channel.clone());
        }
        if let Some(metadata) = &self.metadata {
            for (k, v) in metadata {
                memory.metadata.insert(k.clone(), v.clone());
            }
        }
        if let Some(embedding) = &self.embedding {
            memory.embedding = Some(embedding.clone());
        }
        memory.updated_at = self.updated_at;
    }
}

fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Normal => "normal",
        Priority::Low => "low",
    }
}

fn continue_from_id(events: &[Event]) -> Option<SessionId> {
    events
        .iter()
        .find(|e| e.event_type == EventType::SessionStarted)?
        .payload
        .get("continueFrom")?
        .as_str()?
        .parse()
        .ok()
}

/// Glob semantics from spec §4.3: `*` -> `.*`, `?` -> `.`, everything else
/// literal.
fn glob_to_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn manager() -> (EventStore, SessionId, MemoryManager) {
        let store = EventStore::open_in_memory().unwrap();
        let session_id = SessionId::new();
        let mgr = MemoryManager::open(store.clone(), session_id).unwrap();
        (store, session_id, mgr)
    }

    #[test]
    fn save_then_reopen_reproduces_the_same_memory() {
        let (store, session_id, mut mgr) = manager();
        mgr.save(
            "k",
            "v",
            SaveOptions {
                category: Some("task".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let reopened = MemoryManager::open(store, session_id).unwrap();
        let memory = reopened.get("k").unwrap();
        assert_eq!(memory.value, "v");
        assert_eq!(memory.category.as_deref(), Some("task"));
    }

    #[test]
    fn save_twice_with_same_key_fails() {
        let (_, _, mut mgr) = manager();
        mgr.save("k", "v", SaveOptions::default()).unwrap();
        let err = mgr.save("k", "v2", SaveOptions::default()).unwrap_err();
        assert_eq!(err.kind(), cortex_types::Kind::AlreadyExists);
    }

    #[test]
    fn update_missing_key_fails() {
        let (_, _, mut mgr) = manager();
        let err = mgr
            .update("missing", MemoryPatch::default())
            .unwrap_err();
        assert_eq!(err.kind(), cortex_types::Kind::NotFound);
    }

    #[test]
    fn update_merges_shallow_metadata() {
        let (_, _, mut mgr) = manager();
        let mut metadata = cortex_types::domain::Metadata::new();
        metadata.insert("a".into(), serde_json::json!(1));
        mgr.save(
            "k",
            "v",
            SaveOptions {
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .unwrap();

        let mut patch_metadata = cortex_types::domain::Metadata::new();
        patch_metadata.insert("b".into(), serde_json::json!(2));
        mgr.update(
            "k",
            MemoryPatch {
                metadata: Some(patch_metadata),
                ..Default::default()
            },
        )
        .unwrap();

        let memory = mgr.get("k").unwrap();
        assert_eq!(memory.metadata.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(memory.metadata.get("b"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn delete_then_replay_yields_no_memory() {
        let (store, session_id, mut mgr) = manager();
        mgr.save("k", "v", SaveOptions::default()).unwrap();
        assert!(mgr.delete("k").unwrap());
        assert!(!mgr.delete("k").unwrap());

        let reopened = MemoryManager::open(store, session_id).unwrap();
        assert!(reopened.get("k").is_none());
    }

    #[test]
    fn recall_matches_glob_key_pattern() {
        let (_, _, mut mgr) = manager();
        mgr.save("task.a", "1", SaveOptions::default()).unwrap();
        mgr.save("task.b", "2", SaveOptions::default()).unwrap();
        mgr.save("other", "3", SaveOptions::default()).unwrap();

        let results = mgr
            .recall(&RecallQuery {
                key_pattern: Some("task.*".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn recall_paginates_with_offset_and_limit() {
        let (_, _, mut mgr) = manager();
        for i in 0..5 {
            mgr.save(&format!("k{i}"), "v", SaveOptions::default()).unwrap();
        }
        let page = mgr
            .recall(&RecallQuery {
                offset: Some(2),
                limit: Some(2),
                sort: Some(SortOrder::CreatedAsc),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].key, "k2");
        assert_eq!(page[1].key, "k3");
    }

    #[test]
    fn semantic_search_joins_vector_hits_to_memories() {
        let store = EventStore::open_in_memory().unwrap();
        let session_id = SessionId::new();
        let index: Arc<Mutex<dyn VectorIndex>> =
            Arc::new(Mutex::new(cortex_search::InMemoryVectorIndex::new(2)));
        let mut mgr =
            MemoryManager::open_with_vector_index(store, session_id, Some(index)).unwrap();

        mgr.save(
            "k",
            "v",
            SaveOptions {
                embedding: Some(vec![1.0, 0.0]),
                ..Default::default()
            },
        )
        .unwrap();

        let hits = mgr.semantic_search(&[1.0, 0.0], 10, None, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.key, "k");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }
}
