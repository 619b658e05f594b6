//! Shared versioned storage backing the Graph Manager, Temporal Store,
//! Lineage Engine, and Evolution Engine (spec §4.5-§4.8).
//!
//! Every write here is `expire-current-then-insert-new-version`, the same
//! pattern for both entities and relationships (spec §4.6: "storeEntity ...
//! storeRelationship: same pattern"), wrapped in one transaction per write
//! (spec §5 locking discipline).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use cortex_types::domain::{EntityType, EntityVersion, GraphEntity, GraphRelationship, RelationshipType};
use cortex_types::{EntityId, RelationshipId};

use crate::db::GraphDatabase;
use crate::error::Result;
use crate::queries::{entity, relationship};

#[derive(Clone)]
pub struct GraphStore {
    db: Arc<Mutex<GraphDatabase>>,
}

impl GraphStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(GraphDatabase::open(path)?)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(GraphDatabase::open_in_memory()?)),
        })
    }

    /// Writes the first version of a brand-new entity (no prior current
    /// row to expire).
    pub fn insert_entity(
        &self,
        id: EntityId,
        entity_type: EntityType,
        name: &str,
        properties: &BTreeMap<String, serde_json::Value>,
        event_time: DateTime<Utc>,
    ) -> Result<GraphEntity> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        let now = Utc::now();
        entity::insert_version(
            &db.conn,
            &entity::NewVersion {
                entity_id: id,
                version: 1,
                entity_type,
                name,
                properties,
                created_at: now,
                updated_at: now,
                event_time,
                ingestion_time: now,
                valid_from: now,
            },
        )?;
        Ok(entity::get_current(&db.conn, &id)?.expect("just inserted"))
    }

    /// Closes the current row and opens `version = prev + 1` from `patch`
    /// applied over the current row (spec §4.6 `updateEntity`/`storeEntity`).
    pub fn store_entity_version(
        &self,
        id: EntityId,
        entity_type: EntityType,
        name: &str,
        properties: &BTreeMap<String, serde_json::Value>,
        event_time: DateTime<Utc>,
    ) -> Result<GraphEntity> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        let now = Utc::now();
        let prev_version = entity::max_version(&db.conn, &id)?.unwrap_or(0);
        entity::expire_current(&db.conn, &id, now)?;
        entity::insert_version(
            &db.conn,
            &entity::NewVersion {
                entity_id: id,
                version: prev_version + 1,
                entity_type,
                name,
                properties,
                created_at: now,
                updated_at: now,
                event_time,
                ingestion_time: now,
                valid_from: now,
            },
        )?;
        Ok(entity::get_current(&db.conn, &id)?.expect("just inserted"))
    }

    /// Sets the current row's `validTo` without inserting a tombstone row
    /// (spec §4.6 `invalidateEntity`).
    pub fn invalidate_entity(&self, id: &EntityId) -> Result<()> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::expire_current(&db.conn, id, Utc::now())?;
        Ok(())
    }

    pub fn get_entity(&self, id: &EntityId) -> Result<Option<GraphEntity>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::get_current(&db.conn, id)
    }

    pub fn get_entity_at_time(&self, id: &EntityId, at: DateTime<Utc>) -> Result<Option<EntityVersion>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::get_at_time(&db.conn, id, at)
    }

    pub fn get_entity_history(&self, id: &EntityId) -> Result<Vec<EntityVersion>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::get_history(&db.conn, id)
    }

    pub fn delete_entity(&self, id: &EntityId) -> Result<()> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::delete_all_versions(&db.conn, id)
    }

    pub fn entity_exists(&self, id: &EntityId) -> Result<bool> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::exists_current(&db.conn, id)
    }

    pub fn find_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<GraphEntity>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        entity::find_by_type(&db.conn, entity_type)
    }

    pub fn insert_relationship(
        &self,
        id: RelationshipId,
        relationship_type: RelationshipType,
        source_id: EntityId,
        target_id: EntityId,
        weight: f64,
        properties: &BTreeMap<String, serde_json::Value>,
        event_time: DateTime<Utc>,
    ) -> Result<GraphRelationship> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        let now = Utc::now();
        relationship::insert_version(
            &db.conn,
            &relationship::NewVersion {
                relationship_id: id,
                version: 1,
                relationship_type,
                source_id,
                target_id,
                weight,
                properties,
                created_at: now,
                updated_at: now,
                event_time,
                ingestion_time: now,
                valid_from: now,
            },
        )?;
        Ok(relationship::get_current(&db.conn, &id)?.expect("just inserted"))
    }

    pub fn store_relationship_version(
        &self,
        id: RelationshipId,
        relationship_type: RelationshipType,
        source_id: EntityId,
        target_id: EntityId,
        weight: f64,
        properties: &BTreeMap<String, serde_json::Value>,
        event_time: DateTime<Utc>,
    ) -> Result<GraphRelationship> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        let now = Utc::now();
        let prev_version = relationship::max_version(&db.conn, &id)?.unwrap_or(0);
        relationship::expire_current(&db.conn, &id, now)?;
        relationship::insert_version(
            &db.conn,
            &relationship::NewVersion {
                relationship_id: id,
                version: prev_version + 1,
                relationship_type,
                source_id,
                target_id,
                weight,
                properties,
                created_at: now,
                updated_at: now,
                event_time,
                ingestion_time: now,
                valid_from: now,
            },
        )?;
        Ok(relationship::get_current(&db.conn, &id)?.expect("just inserted"))
    }

    pub fn get_relationship(&self, id: &RelationshipId) -> Result<Option<GraphRelationship>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        relationship::get_current(&db.conn, id)
    }

    pub fn delete_relationship(&self, id: &RelationshipId) -> Result<()> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        relationship::delete_all_versions(&db.conn, id)
    }

    pub fn find_relationships_by_entity(&self, id: &EntityId) -> Result<Vec<GraphRelationship>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        relationship::find_by_entity(&db.conn, id)
    }

    /// `DERIVED_FROM` edges pointing away from `id` (its parents).
    pub fn find_derived_from_parents(&self, id: &EntityId) -> Result<Vec<GraphRelationship>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        relationship::find_derived_from_by_source(&db.conn, id)
    }

    /// `DERIVED_FROM` edges pointing at `id` (its children).
    pub fn find_derived_from_children(&self, id: &EntityId) -> Result<Vec<GraphRelationship>> {
        let db = self.db.lock().expect("graph store database lock poisoned");
        relationship::find_derived_from_by_target(&db.conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_entity_version_closes_previous_and_bumps_version() {
        let store = GraphStore::open_in_memory().unwrap();
        let id = EntityId::new();
        let props = BTreeMap::new();
        store
            .insert_entity(id, EntityType::CodeFile, "a.rs", &props, Utc::now())
            .unwrap();
        let updated = store
            .store_entity_version(id, EntityType::CodeFile, "b.rs", &props, Utc::now())
            .unwrap();

        assert_eq!(updated.name, "b.rs");
        assert_eq!(store.get_entity_history(&id).unwrap().len(), 2);
    }
}
