//! Ancestor/descendant/path/graph queries over `DERIVED_FROM` edges only
//! (spec §4.7). A `DERIVED_FROM` edge points from the derived entity to its
//! parent, so "ancestors" walk outward along edge direction and
//! "descendants" walk inward against it.

use std::collections::{HashSet, VecDeque};

use cortex_types::domain::{GraphEntity, GraphRelationship};
use cortex_types::EntityId;

use crate::error::{Error, Result};
use crate::store::GraphStore;

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub entity: GraphEntity,
    pub generation: i32,
    pub derivation: Option<GraphRelationship>,
}

#[derive(Debug, Clone)]
pub struct LineageGraph {
    pub center_entity_id: EntityId,
    pub nodes: Vec<GraphEntity>,
    pub edges: Vec<GraphRelationship>,
    pub ancestor_count: usize,
    pub descendant_count: usize,
}

pub struct LineageEngine {
    store: GraphStore,
}

impl LineageEngine {
    pub fn new(store: GraphStore) -> Self {
        Self { store }
    }

    fn get_entity(&self, id: &EntityId) -> Result<GraphEntity> {
        self.store
            .get_entity(id)?
            .ok_or_else(|| Error::LineageEntityNotFound(id.to_string()))
    }

    /// BFS outward following `DERIVED_FROM` from `entity_id` (its parents,
    /// grandparents, ...), ordered by depth ascending then stable by id
    /// (spec §4.7 `getAncestors`).
    pub fn get_ancestors(&self, entity_id: &EntityId, max_depth: u32) -> Result<Vec<GraphEntity>> {
        self.get_entity(entity_id)?;
        self.bfs(*entity_id, max_depth, Direction::Ancestors)
    }

    /// BFS inward: entities that derive from `entity_id`, directly or
    /// transitively (spec §4.7 `getDescendants`).
    pub fn get_descendants(&self, entity_id: &EntityId, max_depth: u32) -> Result<Vec<GraphEntity>> {
        self.get_entity(entity_id)?;
        self.bfs(*entity_id, max_depth, Direction::Descendants)
    }

    fn bfs(&self, start: EntityId, max_depth: u32, direction: Direction) -> Result<Vec<GraphEntity>> {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut frontier: VecDeque<(EntityId, u32)> = VecDeque::new();
        frontier.push_back((start, 0));
        let mut by_depth: Vec<Vec<EntityId>> = Vec::new();

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let neighbors = match direction {
                Direction::Ancestors => self.store.find_derived_from_parents(&current)?,
                Direction::Descendants => self.store.find_derived_from_children(&current)?,
            };
            for edge in neighbors {
                let next = match direction {
                    Direction::Ancestors => edge.target_id,
                    Direction::Descendants => edge.source_id,
                };
                if visited.insert(next) {
                    let next_depth = depth + 1;
                    if by_depth.len() < next_depth as usize {
                        by_depth.resize(next_depth as usize, Vec::new());
                    }
                    by_depth[(next_depth - 1) as usize].push(next);
                    frontier.push_back((next, next_depth));
                }
            }
        }

        let mut results = Vec::new();
        for mut ids in by_depth {
            ids.sort();
            for id in ids {
                results.push(self.get_entity(&id)?);
            }
        }
        Ok(results)
    }

    /// Shortest path under `DERIVED_FROM`, direction-agnostic (spec §4.7
    /// `getLineagePath`): BFS treating edges as undirected so a path can
    /// run through a common ancestor.
    pub fn get_lineage_path(&self, from_id: &EntityId, to_id: &EntityId) -> Result<Vec<GraphEntity>> {
        self.get_entity(from_id)?;
        self.get_entity(to_id)?;

        if from_id == to_id {
            return Ok(vec![self.get_entity(from_id)?]);
        }

        let mut visited = HashSet::new();
        visited.insert(*from_id);
        let mut queue = VecDeque::new();
        queue.push_back(vec![*from_id]);

        while let Some(path) = queue.pop_front() {
            let current = *path.last().expect("path is never empty");
            let mut neighbors: Vec<EntityId> = self
                .store
                .find_derived_from_parents(&current)?
                .into_iter()
                .map(|e| e.target_id)
                .collect();
            neighbors.extend(
                self.store
                    .find_derived_from_children(&current)?
                    .into_iter()
                    .map(|e| e.source_id),
            );

            for next in neighbors {
                if next == *to_id {
                    let mut found = path.clone();
                    found.push(next);
                    let mut entities = Vec::with_capacity(found.len());
                    for id in found {
                        entities.push(self.get_entity(&id)?);
                    }
                    return Ok(entities);
                }
                if visited.insert(next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    queue.push_back(extended);
                }
            }
        }

        Err(Error::LineagePathNotFound {
            from: from_id.to_string(),
            to: to_id.to_string(),
        })
    }

    /// Ancestors with no outgoing `DERIVED_FROM` edge of their own (spec
    /// §4.7 `getRootAncestors`).
    pub fn get_root_ancestors(&self, entity_id: &EntityId) -> Result<Vec<GraphEntity>> {
        let ancestors = self.get_ancestors(entity_id, u32::MAX)?;
        let mut roots = Vec::new();
        for ancestor in ancestors {
            if self.store.find_derived_from_parents(&ancestor.id)?.is_empty() {
                roots.push(ancestor);
            }
        }
        Ok(roots)
    }

    /// Ancestors (negative generation), self (0), descendants (positive),
    /// deduped by id, sorted by generation ascending (spec §4.7
    /// `getEvolutionTimeline`).
    pub fn get_evolution_timeline(&self, entity_id: &EntityId, max_depth: u32) -> Result<Vec<TimelineEntry>> {
        let center = self.get_entity(entity_id)?;
        let mut entries = Vec::new();

        for (depth, ancestor) in self.bfs_with_derivation(*entity_id, max_depth, Direction::Ancestors)? {
            entries.push(TimelineEntry {
                entity: ancestor.0,
                generation: -(depth as i32),
                derivation: ancestor.1,
            });
        }
        entries.push(TimelineEntry {
            entity: center,
            generation: 0,
            derivation: None,
        });
        for (depth, descendant) in self.bfs_with_derivation(*entity_id, max_depth, Direction::Descendants)? {
            entries.push(TimelineEntry {
                entity: descendant.0,
                generation: depth as i32,
                derivation: descendant.1,
            });
        }

        entries.sort_by_key(|e| e.generation);
        Ok(entries)
    }

    fn bfs_with_derivation(
        &self,
        start: EntityId,
        max_depth: u32,
        direction: Direction,
    ) -> Result<Vec<(u32, (GraphEntity, Option<GraphRelationship>))>> {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut frontier: VecDeque<(EntityId, u32)> = VecDeque::new();
        frontier.push_back((start, 0));
        let mut results = Vec::new();

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let neighbors = match direction {
                Direction::Ancestors => self.store.find_derived_from_parents(&current)?,
                Direction::Descendants => self.store.find_derived_from_children(&current)?,
            };
            for edge in neighbors {
                let next = match direction {
                    Direction::Ancestors => edge.target_id,
                    Direction::Descendants => edge.source_id,
                };
                if visited.insert(next) {
                    let entity = self.get_entity(&next)?;
                    results.push((depth + 1, (entity, Some(edge))));
                    frontier.push_back((next, depth + 1));
                }
            }
        }
        Ok(results)
    }

    /// Subgraph for visualization (spec §4.7 `buildLineageGraph`).
    pub fn build_lineage_graph(&self, entity_id: &EntityId, depth: u32) -> Result<LineageGraph> {
        let center = self.get_entity(entity_id)?;
        let ancestors = self.get_ancestors(entity_id, depth)?;
        let descendants = self.get_descendants(entity_id, depth)?;

        let mut node_ids: HashSet<EntityId> = HashSet::new();
        node_ids.insert(center.id);
        let mut nodes = vec![center];
        for entity in ancestors.iter().chain(descendants.iter()) {
            if node_ids.insert(entity.id) {
                nodes.push(entity.clone());
            }
        }

        let mut edges = Vec::new();
        for node in &nodes {
            for edge in self.store.find_derived_from_parents(&node.id)? {
                if node_ids.contains(&edge.target_id) {
                    edges.push(edge);
                }
            }
        }

        Ok(LineageGraph {
            center_entity_id: *entity_id,
            nodes,
            edges,
            ancestor_count: ancestors.len(),
            descendant_count: descendants.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ancestors,
    Descendants,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{EntityInput, GraphManager, RelationshipInput};
    use cortex_types::domain::{EntityType, RelationshipType};
    use std::collections::BTreeMap;

    fn chain() -> (GraphManager, LineageEngine, EntityId, EntityId, EntityId, EntityId) {
        let store = GraphStore::open_in_memory().unwrap();
        let manager = GraphManager::new(store.clone(), 100, true);
        let lineage = LineageEngine::new(store);

        let e1 = manager.create_entity(EntityType::Task, EntityInput { name: "E1".into(), ..Default::default() }).unwrap();
        let e2 = manager.create_entity(EntityType::Task, EntityInput { name: "E2".into(), ..Default::default() }).unwrap();
        let e3 = manager.create_entity(EntityType::Task, EntityInput { name: "E3".into(), ..Default::default() }).unwrap();
        let e4 = manager.create_entity(EntityType::Task, EntityInput { name: "E4".into(), ..Default::default() }).unwrap();

        let derive = |src: EntityId, dst: EntityId| {
            manager
                .create_relationship(
                    RelationshipType::DerivedFrom,
                    RelationshipInput { source_id: src, target_id: dst, weight: 1.0, properties: BTreeMap::new(), event_time: None },
                )
                .unwrap();
        };
        derive(e1.id, e2.id);
        derive(e2.id, e3.id);
        derive(e4.id, e1.id);

        (manager, lineage, e1.id, e2.id, e3.id, e4.id)
    }

    #[test]
    fn ancestors_and_descendants_match_spec_example() {
        let (_mgr, lineage, e1, e2, e3, e4) = chain();

        let ancestors: Vec<EntityId> = lineage.get_ancestors(&e1, 10).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ancestors, vec![e2, e3]);

        let descendants: Vec<EntityId> = lineage.get_descendants(&e1, 10).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(descendants, vec![e4]);
    }

    #[test]
    fn lineage_path_traverses_through_common_ancestor() {
        let (_mgr, lineage, e1, _e2, e3, e4) = chain();
        let path: Vec<EntityId> = lineage.get_lineage_path(&e4, &e3).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(path.first(), Some(&e4));
        assert_eq!(path.last(), Some(&e3));
        assert!(path.contains(&e1));
    }

    #[test]
    fn lineage_path_not_found_for_disconnected_entities() {
        let store = GraphStore::open_in_memory().unwrap();
        let manager = GraphManager::new(store.clone(), 100, true);
        let lineage = LineageEngine::new(store);
        let a = manager.create_entity(EntityType::Task, EntityInput { name: "a".into(), ..Default::default() }).unwrap();
        let b = manager.create_entity(EntityType::Task, EntityInput { name: "b".into(), ..Default::default() }).unwrap();
        assert!(lineage.get_lineage_path(&a.id, &b.id).is_err());
    }
}
