//! Bi-temporal property-graph domain types (spec §3, §4.5-4.8).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, RelationshipId};

/// Entity type registry shared with the Entity Extractor (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    CodeFile,
    CodeFunction,
    CodeClass,
    Decision,
    Task,
    Error,
    Concept,
    Event,
}

/// Relationship type registry shared with the Relationship Inferencer
/// (spec §4.11). `DerivedFrom` is the single type consumed by lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    DependsOn,
    Implements,
    Uses,
    References,
    Causes,
    Blocks,
    RelatedTo,
    DerivedFrom,
}

pub type Properties = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
    pub ingestion_time: DateTime<Utc>,
    /// Bi-temporal overlay, present once the entity is under Temporal Store
    /// management (spec §4.6).
    pub version_info: Option<VersionInfo>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionInfo {
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub version: u32,
}

impl VersionInfo {
    /// True for the single "current" row per entity (invariant 4).
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: RelationshipId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub properties: Properties,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
    pub ingestion_time: DateTime<Utc>,
}

impl GraphRelationship {
    /// Clamps `weight` into `[0,1]` on write (invariant 7).
    #[must_use]
    pub fn clamp_weight(weight: f64) -> f64 {
        weight.clamp(0.0, 1.0)
    }
}

/// One row per (entityId, version); exactly one row per entity has
/// `valid_to = None` (invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityVersion {
    pub entity_id: EntityId,
    pub version: u32,
    pub entity: GraphEntity,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_clamped_into_unit_interval() {
        assert_eq!(GraphRelationship::clamp_weight(-0.5), 0.0);
        assert_eq!(GraphRelationship::clamp_weight(1.5), 1.0);
        assert_eq!(GraphRelationship::clamp_weight(0.42), 0.42);
    }

    #[test]
    fn version_info_is_current_iff_valid_to_is_none() {
        let now = Utc::now();
        let current = VersionInfo {
            valid_from: now,
            valid_to: None,
            version: 1,
        };
        let superseded = VersionInfo {
            valid_from: now,
            valid_to: Some(now),
            version: 1,
        };
        assert!(current.is_current());
        assert!(!superseded.is_current());
    }
}
