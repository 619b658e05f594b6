//! CRUD over entities and relationships, plus batch merge (spec §4.5).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cortex_types::domain::{EntityType, GraphEntity, GraphRelationship, RelationshipType};
use cortex_types::{EntityId, RelationshipId};
use tracing::warn;

use crate::error::{Error, Result};
use crate::store::GraphStore;

#[derive(Debug, Clone, Default)]
pub struct EntityInput {
    pub name: String,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub event_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
    pub event_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RelationshipInput {
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub weight: f64,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub event_time: Option<DateTime<Utc>>,
}

/// Result of `batchCreateEntities`: entities written before a failure stay
/// written (spec §4.5 "already-written chunks stay").
#[derive(Debug, Default)]
pub struct BatchCreateOutcome {
    pub created: Vec<GraphEntity>,
    pub failed_chunk_index: Option<usize>,
}

pub struct GraphManager {
    store: GraphStore,
    default_batch_size: usize,
    enable_auto_merge: bool,
}

impl GraphManager {
    pub fn new(store: GraphStore, default_batch_size: usize, enable_auto_merge: bool) -> Self {
        Self {
            store,
            default_batch_size: default_batch_size.max(1),
            enable_auto_merge,
        }
    }

    pub fn create_entity(&self, entity_type: EntityType, input: EntityInput) -> Result<GraphEntity> {
        let id = EntityId::new();
        let event_time = input.event_time.unwrap_or_else(Utc::now);
        self.store
            .insert_entity(id, entity_type, &input.name, &input.properties, event_time)
    }

    pub fn get_entity(&self, id: &EntityId) -> Result<GraphEntity> {
        self.store
            .get_entity(id)?
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))
    }

    pub fn update_entity(&self, id: &EntityId, patch: EntityPatch) -> Result<GraphEntity> {
        let current = self.get_entity(id)?;
        let name = patch.name.unwrap_or(current.name);
        let properties = patch.properties.unwrap_or(current.properties);
        let event_time = patch.event_time.unwrap_or(current.event_time);
        self.store
            .store_entity_version(*id, current.entity_type, &name, &properties, event_time)
    }

    pub fn delete_entity(&self, id: &EntityId) -> Result<()> {
        if !self.store.entity_exists(id)? {
            return Err(Error::EntityNotFound(id.to_string()));
        }
        self.store.delete_entity(id)
    }

    pub fn create_relationship(
        &self,
        relationship_type: RelationshipType,
        input: RelationshipInput,
    ) -> Result<GraphRelationship> {
        if relationship_type == RelationshipType::DerivedFrom {
            self.reject_if_cycle(input.source_id, input.target_id)?;
        }
        let id = RelationshipId::new();
        let event_time = input.event_time.unwrap_or_else(Utc::now);
        self.store.insert_relationship(
            id,
            relationship_type,
            input.source_id,
            input.target_id,
            input.weight,
            &input.properties,
            event_time,
        )
    }

    pub fn get_relationship(&self, id: &RelationshipId) -> Result<GraphRelationship> {
        self.store
            .get_relationship(id)?
            .ok_or_else(|| Error::RelationshipNotFound(id.to_string()))
    }

    pub fn delete_relationship(&self, id: &RelationshipId) -> Result<()> {
        self.get_relationship(id)?;
        self.store.delete_relationship(id)
    }

    pub fn find_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<GraphEntity>> {
        self.store.find_entities_by_type(entity_type)
    }

    /// Both directions (spec §4.5 `findRelationshipsByEntity`).
    pub fn find_relationships_by_entity(&self, id: &EntityId) -> Result<Vec<GraphRelationship>> {
        self.store.find_relationships_by_entity(id)
    }

    /// Upsert by id. When auto-merge is disabled, falls back to
    /// get-then-create: an existing entity is returned unchanged rather
    /// than merged (spec §4.5 `mergeEntity`).
    pub fn merge_entity(&self, id: EntityId, entity_type: EntityType, input: EntityInput) -> Result<GraphEntity> {
        let existing = self.store.get_entity(&id)?;
        let event_time = input.event_time.unwrap_or_else(Utc::now);

        match existing {
            Some(current) if !self.enable_auto_merge => Ok(current),
            Some(_) => self
                .store
                .store_entity_version(id, entity_type, &input.name, &input.properties, event_time),
            None => self
                .store
                .insert_entity(id, entity_type, &input.name, &input.properties, event_time),
        }
    }

    /// Chunks `entities` into batches of `default_batch_size`; a failure
    /// aborts the whole batch but entities from already-committed chunks
    /// remain (spec §4.5: "non-atomicity across chunks" is documented, not
    /// hidden).
    pub fn batch_create_entities(
        &self,
        entities: Vec<(EntityType, EntityInput)>,
    ) -> BatchCreateOutcome {
        let mut outcome = BatchCreateOutcome::default();
        for (chunk_index, chunk) in entities.chunks(self.default_batch_size).enumerate() {
            for (entity_type, input) in chunk {
                match self.create_entity(*entity_type, input.clone()) {
                    Ok(created) => outcome.created.push(created),
                    Err(err) => {
                        warn!(chunk_index, error = %err, "batch_create_entities chunk failed");
                        outcome.failed_chunk_index = Some(chunk_index);
                        return outcome;
                    }
                }
            }
        }
        outcome
    }

    /// Cheap cycle check (spec §7 "Lineage graph cycles"): rejects a new
    /// `child DERIVED_FROM parent` edge if `parent` can already transitively
    /// reach `child` via DERIVED_FROM.
    fn reject_if_cycle(&self, child: EntityId, parent: EntityId) -> Result<()> {
        if child == parent {
            return Err(Error::CycleRejected(format!(
                "entity {child} cannot derive from itself"
            )));
        }
        let mut frontier = vec![parent];
        let mut visited = std::collections::HashSet::new();
        while let Some(current) = frontier.pop() {
            if current == child {
                return Err(Error::CycleRejected(format!(
                    "{parent} already transitively derives from {child}"
                )));
            }
            if !visited.insert(current) {
                continue;
            }
            for edge in self.store.find_derived_from_parents(&current)? {
                frontier.push(edge.target_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> GraphManager {
        GraphManager::new(GraphStore::open_in_memory().unwrap(), 100, true)
    }

    #[test]
    fn create_and_get_entity_round_trips() {
        let mgr = manager();
        let created = mgr
            .create_entity(
                EntityType::CodeFile,
                EntityInput {
                    name: "main.rs".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        let fetched = mgr.get_entity(&created.id).unwrap();
        assert_eq!(fetched.name, "main.rs");
    }

    #[test]
    fn merge_entity_falls_back_to_get_then_create_when_auto_merge_disabled() {
        let store = GraphStore::open_in_memory().unwrap();
        let mgr = GraphManager::new(store, 100, false);
        let id = EntityId::new();
        let input = EntityInput {
            name: "v1".to_string(),
            ..Default::default()
        };
        mgr.merge_entity(id, EntityType::Task, input.clone()).unwrap();

        let second = mgr
            .merge_entity(
                id,
                EntityType::Task,
                EntityInput { name: "v2".to_string(), ..Default::default() },
            )
            .unwrap();
        assert_eq!(second.name, "v1");
    }

    #[test]
    fn batch_create_partial_failure_keeps_already_written_chunks() {
        let store = GraphStore::open_in_memory().unwrap();
        let mgr = GraphManager::new(store, 2, true);
        let entities = vec![
            (EntityType::Task, EntityInput { name: "a".into(), ..Default::default() }),
            (EntityType::Task, EntityInput { name: "b".into(), ..Default::default() }),
            (EntityType::Task, EntityInput { name: "c".into(), ..Default::default() }),
        ];
        let outcome = mgr.batch_create_entities(entities);
        assert_eq!(outcome.created.len(), 3);
        assert!(outcome.failed_chunk_index.is_none());
    }

    #[test]
    fn direct_derived_from_cycle_is_rejected() {
        let mgr = manager();
        let a = mgr
            .create_entity(EntityType::Task, EntityInput { name: "a".into(), ..Default::default() })
            .unwrap();
        let b = mgr
            .create_entity(EntityType::Task, EntityInput { name: "b".into(), ..Default::default() })
            .unwrap();

        mgr.create_relationship(
            RelationshipType::DerivedFrom,
            RelationshipInput {
                source_id: a.id,
                target_id: b.id,
                weight: 1.0,
                properties: BTreeMap::new(),
                event_time: None,
            },
        )
        .unwrap();

        let cyclic = mgr.create_relationship(
            RelationshipType::DerivedFrom,
            RelationshipInput {
                source_id: b.id,
                target_id: a.id,
                weight: 1.0,
                properties: BTreeMap::new(),
                event_time: None,
            },
        );
        assert!(cyclic.is_err());
    }
}
