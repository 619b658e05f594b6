//! Wires the Event Store, Session Manager, per-session Memory Managers,
//! Diagnostics Store, bi-temporal graph (Graph Manager, Temporal Store,
//! Lineage Engine, Evolution Engine), Hybrid Search, and the Entity
//! Extractor / Relationship Inferencer into one long-running handle (spec
//! §2 control flow). This is the thing the dispatch table (spec §6.1) is a
//! thin layer over; it owns no transport concerns of its own (those are
//! out of scope per spec §1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use cortex_diagnostics::{DiagnosticsStore, SummaryProvider};
use cortex_graph::{EntityInput, EvolutionEngine, GraphManager, GraphStore, LineageEngine, TemporalStore};
use cortex_nlp::{EntityExtractor, ExtractionContext, RelationshipInferencer, ResolvedEntity};
use cortex_search::{Bm25Index, InMemoryVectorIndex, VectorIndex};
use cortex_store::{EventStore, MemoryManager, SessionManager, StartSessionOptions};
use cortex_types::domain::{EntityType, GraphEntity, Memory, MemoryPatch, RecallQuery, SaveOptions, Session};
use cortex_types::{Configuration, EntityId, SessionId};

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;

/// Every session's cache lives as long as the service — spec §5: "Each
/// session's in-memory cache is owned by its Memory Manager; external
/// readers must go through its API." Callers never get a `MemoryManager`
/// directly; they go through [`CortexService`] methods keyed by
/// `SessionId`, which is the "explicit sessionId on every mutating tool"
/// discipline decided in DESIGN.md for the source's ambiguous "current
/// session" convenience state (spec §9 design notes / open questions).
pub struct CortexService {
    config: Configuration,
    event_store: EventStore,
    session_manager: SessionManager,
    memory_managers: Mutex<HashMap<SessionId, MemoryManager>>,
    diagnostics: Mutex<DiagnosticsStore>,
    graph: GraphManager,
    temporal: TemporalStore,
    lineage: LineageEngine,
    evolution: EvolutionEngine,
    vector_index: Option<Arc<Mutex<dyn VectorIndex>>>,
    bm25: Mutex<Bm25Index>,
    extractor: EntityExtractor,
    inferencer: RelationshipInferencer,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    summary_provider: Option<Arc<dyn SummaryProvider>>,
}

fn sibling_path(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "cortex".to_string());
    base.with_file_name(format!("{stem}-{suffix}"))
}

impl CortexService {
    /// Opens (creating if absent) every store named in `config`. The graph
    /// store has no dedicated config key of its own (spec §6.4 enumerates
    /// `graphEndpoint` for a future external property-graph deployment);
    /// this reference implementation derives a sibling SQLite path from
    /// `dbPath`, matching the one-concrete-implementation design note.
    pub fn open(
        config: Configuration,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        summary_provider: Option<Arc<dyn SummaryProvider>>,
    ) -> Result<Self> {
        tracing::info!(db_path = %config.db_path.display(), "opening cortex service");
        let event_store = EventStore::open(&config.db_path)?;
        let session_manager = SessionManager::new(event_store.clone());
        let diagnostics = DiagnosticsStore::open(&config.diagnostics_db_path)?;
        let graph_path = sibling_path(&config.db_path, "graph.db");
        let graph_store = GraphStore::open(graph_path)?;
        let graph = GraphManager::new(graph_store.clone(), config.default_batch_size, config.enable_auto_merge);
        let temporal = TemporalStore::new(graph_store.clone());
        let lineage = LineageEngine::new(graph_store.clone());
        let evolution = EvolutionEngine::new(graph_store, config.max_timeline_depth);
        let vector_index: Option<Arc<Mutex<dyn VectorIndex>>> = if config.enable_vector_search {
            Some(Arc::new(Mutex::new(InMemoryVectorIndex::new(config.vector_dimensions))))
        } else {
            None
        };
        let extractor = EntityExtractor::new(config.min_confidence)?;
        let inferencer = RelationshipInferencer::new(config.min_confidence)?;

        Ok(Self {
            config,
            event_store,
            session_manager,
            memory_managers: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(diagnostics),
            graph,
            temporal,
            lineage,
            evolution,
            vector_index,
            bm25: Mutex::new(Bm25Index::new(Default::default())),
            extractor,
            inferencer,
            embedding_provider,
            summary_provider,
        })
    }

    /// Opens every store in-memory; used by tests and by `cortex demo`.
    pub fn open_in_memory() -> Result<Self> {
        let event_store = EventStore::open_in_memory()?;
        let session_manager = SessionManager::new(event_store.clone());
        let diagnostics = DiagnosticsStore::open_in_memory()?;
        let graph_store = GraphStore::open_in_memory()?;
        let config = Configuration::default();
        let graph = GraphManager::new(graph_store.clone(), config.default_batch_size, config.enable_auto_merge);
        let temporal = TemporalStore::new(graph_store.clone());
        let lineage = LineageEngine::new(graph_store.clone());
        let evolution = EvolutionEngine::new(graph_store, config.max_timeline_depth);
        let vector_index: Option<Arc<Mutex<dyn VectorIndex>>> =
            Some(Arc::new(Mutex::new(InMemoryVectorIndex::new(config.vector_dimensions))));
        let extractor = EntityExtractor::new(config.min_confidence)?;
        let inferencer = RelationshipInferencer::new(config.min_confidence)?;

        Ok(Self {
            config,
            event_store,
            session_manager,
            memory_managers: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(diagnostics),
            graph,
            temporal,
            lineage,
            evolution,
            vector_index,
            bm25: Mutex::new(Bm25Index::new(Default::default())),
            extractor,
            inferencer,
            embedding_provider: None,
            summary_provider: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn graph(&self) -> &GraphManager {
        &self.graph
    }

    #[must_use]
    pub fn temporal(&self) -> &TemporalStore {
        &self.temporal
    }

    #[must_use]
    pub fn lineage(&self) -> &LineageEngine {
        &self.lineage
    }

    #[must_use]
    pub fn evolution(&self) -> &EvolutionEngine {
        &self.evolution
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Mutex<DiagnosticsStore> {
        &self.diagnostics
    }

    #[must_use]
    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    // ---- Session Manager ---------------------------------------------

    pub fn start_session(&self, opts: StartSessionOptions) -> Result<Session> {
        Ok(self.session_manager.start_session(opts)?)
    }

    pub fn end_session(&self, id: &SessionId) -> Result<()> {
        self.session_manager.end_session(id)?;
        self.memory_managers.lock().unwrap().remove(id);
        Ok(())
    }

    pub fn get_session(&self, id: &SessionId) -> Result<Session> {
        Ok(self.session_manager.get_session(id)?)
    }

    pub fn list_sessions(&self, filter: &cortex_types::domain::SessionFilter) -> Result<Vec<Session>> {
        Ok(self.session_manager.list_sessions(filter)?)
    }

    // ---- Memory Manager (single-writer per session, cached) -----------

    /// Runs `f` against the cached, hydrated `MemoryManager` for
    /// `session_id`, opening (hydrating) it on first access. Per spec §4.3
    /// "A Memory Manager instance is single-writer per session" — the
    /// whole call executes under the registry lock, so two dispatch calls
    /// for the same session never interleave their mutation.
    fn with_memory<R>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&mut MemoryManager) -> Result<R>,
    ) -> Result<R> {
        let mut registry = self.memory_managers.lock().unwrap();
        if !registry.contains_key(&session_id) {
            let manager = MemoryManager::open_with_vector_index(
                self.event_store.clone(),
                session_id,
                self.vector_index.clone(),
            )?;
            registry.insert(session_id, manager);
        }
        let manager = registry.get_mut(&session_id).expect("just inserted");
        f(manager)
    }

    pub fn save_memory(
        &self,
        session_id: SessionId,
        key: &str,
        value: &str,
        opts: SaveOptions,
    ) -> Result<Memory> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_memory(session_id, move |m| Ok(m.save(&key, &value, opts)?))
    }

    pub fn save_or_update_memory(
        &self,
        session_id: SessionId,
        key: &str,
        value: &str,
        opts: SaveOptions,
    ) -> Result<Memory> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_memory(session_id, move |m| Ok(m.save_or_update(&key, &value, opts)?))
    }

    pub fn update_memory(&self, session_id: SessionId, key: &str, patch: MemoryPatch) -> Result<Memory> {
        let key = key.to_string();
        self.with_memory(session_id, move |m| Ok(m.update(&key, patch)?))
    }

    pub fn delete_memory(&self, session_id: SessionId, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_memory(session_id, move |m| Ok(m.delete(&key)?))
    }

    pub fn get_memory(&self, session_id: SessionId, key: &str) -> Result<Option<Memory>> {
        let key = key.to_string();
        self.with_memory(session_id, move |m| Ok(m.get(&key).cloned()))
    }

    pub fn recall(&self, session_id: SessionId, query: RecallQuery) -> Result<Vec<Memory>> {
        self.with_memory(session_id, move |m| Ok(m.recall(&query)?))
    }

    pub fn checkpoint(&self, session_id: SessionId, description: Option<String>) -> Result<()> {
        let memory_count = self.with_memory(session_id, |m| Ok(m.count()))?;
        self.event_store
            .create_checkpoint(&session_id, memory_count as u64, description.as_deref())?;
        Ok(())
    }

    pub fn memory_stats(&self, session_id: SessionId) -> Result<cortex_types::domain::MemoryStats> {
        self.with_memory(session_id, |m| Ok(m.get_stats()))
    }

    // ---- Entity Extractor / Relationship Inferencer integration -------

    /// Extracts entities from `text`, resolves each to a persisted graph
    /// entity (find-by-`(type, lowercased name)` else create), infers
    /// relationships between the resolved set, persists those too, and
    /// returns the resolved entity ids (spec §4.10, §4.11; `context_save`'s
    /// `entityIds?` response field).
    pub fn extract_and_link(
        &self,
        text: &str,
        context: Option<&ExtractionContext>,
    ) -> Result<Vec<EntityId>> {
        let extracted = self.extractor.extract_with_context(text, context);
        let mut resolved = Vec::with_capacity(extracted.len());
        for entity in &extracted {
            let graph_entity = self.resolve_or_create_entity(entity.entity_type, &entity.name, entity)?;
            resolved.push(ResolvedEntity::from_extracted(graph_entity.id, entity));
        }

        let relationships = self.inferencer.infer(text, &resolved);
        tracing::debug!(entities = resolved.len(), relationships = relationships.len(), "extracted entities and relationships");
        for rel in relationships {
            self.graph.create_relationship(
                rel.relationship_type,
                cortex_graph::RelationshipInput {
                    source_id: rel.source_id,
                    target_id: rel.target_id,
                    weight: rel.weight,
                    properties: Default::default(),
                    event_time: None,
                },
            )?;
        }

        Ok(resolved.into_iter().map(|r| r.id).collect())
    }

    fn resolve_or_create_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        extracted: &cortex_nlp::ExtractedEntity,
    ) -> Result<GraphEntity> {
        let existing = self
            .graph
            .find_entities_by_type(entity_type)?
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name));
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let mut properties = std::collections::BTreeMap::new();
        properties.insert("confidence".to_string(), serde_json::json!(extracted.confidence));
        if let Some(key) = &extracted.context_key {
            properties.insert("contextKey".to_string(), serde_json::json!(key));
        }
        if let Some(category) = &extracted.context_category {
            properties.insert("contextCategory".to_string(), serde_json::json!(category));
        }

        Ok(self.graph.create_entity(
            entity_type,
            EntityInput {
                name: name.to_string(),
                properties,
                event_time: Some(Utc::now()),
            },
        )?)
    }

    /// Extracts entities from `text` and resolves each to an *existing*
    /// graph entity by `(type, lowercased name)`, same lookup half as
    /// [`Self::resolve_or_create_entity`] but never the create fallback —
    /// a read-only query (Hybrid Search's graph-proximity signal, spec
    /// §4.9) must not mutate the graph as a side effect of searching it.
    pub fn resolve_known_entities(&self, text: &str) -> Result<Vec<EntityId>> {
        let extracted = self.extractor.extract(text);
        let mut ids = Vec::with_capacity(extracted.len());
        for entity in &extracted {
            if let Some(existing) = self
                .graph
                .find_entities_by_type(entity.entity_type)?
                .into_iter()
                .find(|e| e.name.eq_ignore_ascii_case(&entity.name))
            {
                ids.push(existing.id);
            }
        }
        Ok(ids)
    }

    // ---- Hybrid Search --------------------------------------------------

    pub fn bm25_index(&self, doc_id: &str, text: &str) {
        self.bm25.lock().unwrap().index_document(doc_id, text);
    }

    #[must_use]
    pub fn bm25(&self) -> &Mutex<Bm25Index> {
        &self.bm25
    }

    #[must_use]
    pub fn vector_index(&self) -> Option<&Arc<Mutex<dyn VectorIndex>>> {
        self.vector_index.as_ref()
    }

    #[must_use]
    pub fn embedding_provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.embedding_provider.as_ref()
    }

    pub fn summarizer(&self) -> Result<Option<Arc<dyn SummaryProvider>>> {
        Ok(self.summary_provider.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_wires_every_subsystem() {
        let service = CortexService::open_in_memory().unwrap();
        let session = service
            .start_session(StartSessionOptions::default())
            .unwrap();
        assert_eq!(session.status, cortex_types::domain::SessionStatus::Active);
    }

    #[test]
    fn save_then_get_round_trips_through_cached_memory_manager() {
        let service = CortexService::open_in_memory().unwrap();
        let session = service.start_session(StartSessionOptions::default()).unwrap();
        service
            .save_memory(session.id, "k", "v", SaveOptions::default())
            .unwrap();
        let got = service.get_memory(session.id, "k").unwrap().unwrap();
        assert_eq!(got.value, "v");
    }

    #[test]
    fn extract_and_link_dedups_entities_by_type_and_name() {
        let service = CortexService::open_in_memory().unwrap();
        let ids_first = service
            .extract_and_link("fn parse_sarif() is used by diagnostics.rs", None)
            .unwrap();
        let ids_second = service
            .extract_and_link("fn parse_sarif() was renamed", None)
            .unwrap();
        let shared = ids_first.iter().any(|id| ids_second.contains(id));
        assert!(shared, "expected the second extraction to resolve to the same entity");
    }
}
