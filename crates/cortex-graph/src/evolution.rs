//! Per-entity change history synthesized from Temporal Store + Graph
//! Manager (spec §4.8).

use chrono::{DateTime, Utc};
use cortex_types::domain::{EntityVersion, GraphEntity};
use cortex_types::EntityId;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::GraphStore;

/// Wire values are `{created, updated, deleted, related_changed}` (spec
/// §4.8), not the Rust-idiomatic variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    RelatedChanged,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub entity_id: EntityId,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    pub state: GraphEntity,
    pub previous_state: Option<GraphEntity>,
}

#[derive(Debug, Clone, Default)]
pub struct EvolutionQuery {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub change_types: Option<Vec<ChangeType>>,
    pub include_related: bool,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    pub entity_id: EntityId,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone)]
pub struct EvolutionComparison {
    pub correlated_changes: Vec<(Change, Change)>,
    pub common_related_entities: Vec<EntityId>,
}

pub struct EvolutionEngine {
    store: GraphStore,
    max_timeline_depth: usize,
    correlation_window: chrono::Duration,
}

impl EvolutionEngine {
    pub fn new(store: GraphStore, max_timeline_depth: usize) -> Self {
        Self {
            store,
            max_timeline_depth,
            correlation_window: chrono::Duration::hours(1),
        }
    }

    /// One `Change` per version, newest-last. The first version is always
    /// `created`; a later still-current version is `updated`; a closed
    /// version that is the newest overall is `deleted` (spec §4.8).
    pub fn get_evolution(&self, entity_id: &EntityId, query: &EvolutionQuery) -> Result<Timeline> {
        let history = self.store.get_entity_history(entity_id)?;
        if history.is_empty() {
            return Err(Error::EvolutionNotFound(entity_id.to_string()));
        }

        // history is newest-first; walk oldest-first to pair each version
        // with its predecessor.
        let mut oldest_first = history.clone();
        oldest_first.reverse();

        let newest_version = oldest_first.last().map(|v| v.version);
        let mut changes = Vec::new();

        for (index, version) in oldest_first.iter().enumerate() {
            let previous = if index == 0 { None } else { Some(&oldest_first[index - 1]) };
            let change_type = if index == 0 {
                ChangeType::Created
            } else if version.valid_to.is_none() {
                ChangeType::Updated
            } else if Some(version.version) == newest_version {
                ChangeType::Deleted
            } else {
                ChangeType::Updated
            };

            changes.push(Change {
                entity_id: *entity_id,
                change_type,
                timestamp: version.valid_from,
                state: version.entity.clone(),
                previous_state: previous.map(|p| p.entity.clone()),
            });
        }

        if query.include_related {
            changes.extend(self.related_changed_entries(entity_id, &oldest_first, query)?);
            changes.sort_by_key(|c| c.timestamp);
        }

        let filtered: Vec<Change> = changes
            .into_iter()
            .filter(|c| query.start_time.is_none_or(|start| c.timestamp >= start))
            .filter(|c| query.end_time.is_none_or(|end| c.timestamp <= end))
            .filter(|c| {
                query
                    .change_types
                    .as_ref()
                    .is_none_or(|types| types.contains(&c.change_type))
            })
            .take(self.max_timeline_depth)
            .collect();

        Ok(Timeline {
            entity_id: *entity_id,
            changes: filtered,
        })
    }

    /// A `related_changed` entry per incident relationship whose endpoint
    /// entity changed within the window spanned by `versions` (only emitted
    /// when `query.include_related` is set).
    fn related_changed_entries(
        &self,
        entity_id: &EntityId,
        versions: &[EntityVersion],
        _query: &EvolutionQuery,
    ) -> Result<Vec<Change>> {
        let window_start = versions.first().map(|v| v.valid_from);
        let window_end = versions.last().map(|v| v.valid_from);
        let mut entries = Vec::new();

        for relationship in self.store.find_relationships_by_entity(entity_id)? {
            let neighbor_id = if relationship.source_id == *entity_id {
                relationship.target_id
            } else {
                relationship.source_id
            };
            let neighbor_history = self.store.get_entity_history(&neighbor_id)?;
            for version in &neighbor_history {
                let in_window = window_start.is_none_or(|start| version.valid_from >= start)
                    && window_end.is_none_or(|end| version.valid_from <= end);
                if in_window {
                    entries.push(Change {
                        entity_id: *entity_id,
                        change_type: ChangeType::RelatedChanged,
                        timestamp: version.valid_from,
                        state: version.entity.clone(),
                        previous_state: None,
                    });
                }
            }
        }
        Ok(entries)
    }

    /// For each incident relationship, that neighbor's timeline (skipping
    /// neighbors with no history) (spec §4.8 `getRelatedEvolution`).
    pub fn get_related_evolution(&self, entity_id: &EntityId) -> Result<Vec<Timeline>> {
        let mut timelines = Vec::new();
        for relationship in self.store.find_relationships_by_entity(entity_id)? {
            let neighbor_id = if relationship.source_id == *entity_id {
                relationship.target_id
            } else {
                relationship.source_id
            };
            match self.get_evolution(&neighbor_id, &EvolutionQuery::default()) {
                Ok(timeline) => timelines.push(timeline),
                Err(Error::EvolutionNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(timelines)
    }

    /// Cross-product of two entities' changes; pairs within the
    /// correlation window are `correlatedChanges`; `commonRelatedEntities`
    /// is the intersection of neighbor id sets (spec §4.8
    /// `compareEvolution`).
    pub fn compare_evolution(&self, a: &EntityId, b: &EntityId) -> Result<EvolutionComparison> {
        let timeline_a = self.get_evolution(a, &EvolutionQuery::default())?;
        let timeline_b = self.get_evolution(b, &EvolutionQuery::default())?;

        let mut correlated = Vec::new();
        for change_a in &timeline_a.changes {
            for change_b in &timeline_b.changes {
                let delta = (change_a.timestamp - change_b.timestamp).num_seconds().abs();
                if delta <= self.correlation_window.num_seconds() {
                    correlated.push((change_a.clone(), change_b.clone()));
                }
            }
        }

        let neighbors_a: std::collections::HashSet<EntityId> = self
            .store
            .find_relationships_by_entity(a)?
            .into_iter()
            .map(|r| if r.source_id == *a { r.target_id } else { r.source_id })
            .collect();
        let neighbors_b: std::collections::HashSet<EntityId> = self
            .store
            .find_relationships_by_entity(b)?
            .into_iter()
            .map(|r| if r.source_id == *b { r.target_id } else { r.source_id })
            .collect();
        let common_related_entities: Vec<EntityId> = neighbors_a.intersection(&neighbors_b).copied().collect();

        Ok(EvolutionComparison {
            correlated_changes: correlated,
            common_related_entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{EntityInput, GraphManager};
    use cortex_types::domain::EntityType;

    #[test]
    fn first_version_is_created_and_later_current_version_is_updated() {
        let store = GraphStore::open_in_memory().unwrap();
        let manager = GraphManager::new(store.clone(), 100, true);
        let engine = EvolutionEngine::new(store.clone(), 100);

        let entity = manager
            .create_entity(EntityType::Task, EntityInput { name: "v1".into(), ..Default::default() })
            .unwrap();
        manager
            .update_entity(&entity.id, crate::manager::EntityPatch { name: Some("v2".into()), ..Default::default() })
            .unwrap();

        let timeline = engine.get_evolution(&entity.id, &EvolutionQuery::default()).unwrap();
        assert_eq!(timeline.changes.len(), 2);
        assert_eq!(timeline.changes[0].change_type, ChangeType::Created);
        assert_eq!(timeline.changes[1].change_type, ChangeType::Updated);
    }

    #[test]
    fn unknown_entity_evolution_is_not_found() {
        let store = GraphStore::open_in_memory().unwrap();
        let engine = EvolutionEngine::new(store, 100);
        assert!(engine.get_evolution(&EntityId::new(), &EvolutionQuery::default()).is_err());
    }
}
