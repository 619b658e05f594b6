//! Parameterized queries over the versioned `relationships` table (spec
//! §4.5, §4.6). `GraphRelationship` carries no version overlay in the
//! domain model, so version bookkeeping here is internal to the store:
//! callers only ever see the current row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cortex_types::domain::{GraphRelationship, RelationshipType};
use cortex_types::{EntityId, RelationshipId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

pub struct NewVersion<'a> {
    pub relationship_id: RelationshipId,
    pub version: i64,
    pub relationship_type: RelationshipType,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub weight: f64,
    pub properties: &'a BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
    pub ingestion_time: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
}

pub fn insert_version(conn: &Connection, new: &NewVersion<'_>) -> Result<()> {
    let properties_text = serde_json::to_string(new.properties)?;
    conn.execute(
        "INSERT INTO relationships (relationship_id, version, relationship_type, source_id,
            target_id, weight, properties, created_at, updated_at, event_time, ingestion_time,
            valid_from, valid_to)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL)",
        params![
            new.relationship_id.to_string(),
            new.version,
            relationship_type_str(new.relationship_type),
            new.source_id.to_string(),
            new.target_id.to_string(),
            GraphRelationship::clamp_weight(new.weight),
            properties_text,
            new.created_at.to_rfc3339(),
            new.updated_at.to_rfc3339(),
            new.event_time.to_rfc3339(),
            new.ingestion_time.to_rfc3339(),
            new.valid_from.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn expire_current(conn: &Connection, relationship_id: &RelationshipId, valid_to: DateTime<Utc>) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE relationships SET valid_to = ?2 WHERE relationship_id = ?1 AND valid_to IS NULL",
        params![relationship_id.to_string(), valid_to.to_rfc3339()],
    )?;
    Ok(affected)
}

pub fn max_version(conn: &Connection, relationship_id: &RelationshipId) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT max(version) FROM relationships WHERE relationship_id = ?1",
        params![relationship_id.to_string()],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn get_current(conn: &Connection, relationship_id: &RelationshipId) -> Result<Option<GraphRelationship>> {
    conn.query_row(
        "SELECT relationship_id, relationship_type, source_id, target_id, weight, properties,
            created_at, updated_at, event_time, ingestion_time
         FROM relationships WHERE relationship_id = ?1 AND valid_to IS NULL",
        params![relationship_id.to_string()],
        row_to_relationship,
    )
    .optional()
    .map_err(Into::into)
}

pub fn delete_all_versions(conn: &Connection, relationship_id: &RelationshipId) -> Result<()> {
    conn.execute(
        "DELETE FROM relationships WHERE relationship_id = ?1",
        params![relationship_id.to_string()],
    )?;
    Ok(())
}

/// Both directions: relationships where `entity_id` is either the source
/// or the target (spec §4.5 `findRelationshipsByEntity`).
pub fn find_by_entity(conn: &Connection, entity_id: &EntityId) -> Result<Vec<GraphRelationship>> {
    let mut stmt = conn.prepare(
        "SELECT relationship_id, relationship_type, source_id, target_id, weight, properties,
            created_at, updated_at, event_time, ingestion_time
         FROM relationships
         WHERE (source_id = ?1 OR target_id = ?1) AND valid_to IS NULL
         ORDER BY relationship_id ASC",
    )?;
    let rows = stmt.query_map(params![entity_id.to_string()], row_to_relationship)?;
    let mut relationships = Vec::new();
    for row in rows {
        relationships.push(row?);
    }
    Ok(relationships)
}

/// Current `DERIVED_FROM` edges whose source is `entity_id` (child → parent,
/// spec §3 glossary: "a DERIVED_FROM edge points from the derived entity to
/// its parent").
pub fn find_derived_from_by_source(conn: &Connection, entity_id: &EntityId) -> Result<Vec<GraphRelationship>> {
    let mut stmt = conn.prepare(
        "SELECT relationship_id, relationship_type, source_id, target_id, weight, properties,
            created_at, updated_at, event_time, ingestion_time
         FROM relationships
         WHERE source_id = ?1 AND relationship_type = 'DERIVED_FROM' AND valid_to IS NULL
         ORDER BY target_id ASC",
    )?;
    let rows = stmt.query_map(params![entity_id.to_string()], row_to_relationship)?;
    let mut relationships = Vec::new();
    for row in rows {
        relationships.push(row?);
    }
    Ok(relationships)
}

/// Current `DERIVED_FROM` edges whose target is `entity_id` (i.e. `entity_id`
/// is the parent of whichever entities are derived from it).
pub fn find_derived_from_by_target(conn: &Connection, entity_id: &EntityId) -> Result<Vec<GraphRelationship>> {
    let mut stmt = conn.prepare(
        "SELECT relationship_id, relationship_type, source_id, target_id, weight, properties,
            created_at, updated_at, event_time, ingestion_time
         FROM relationships
         WHERE target_id = ?1 AND relationship_type = 'DERIVED_FROM' AND valid_to IS NULL
         ORDER BY source_id ASC",
    )?;
    let rows = stmt.query_map(params![entity_id.to_string()], row_to_relationship)?;
    let mut relationships = Vec::new();
    for row in rows {
        relationships.push(row?);
    }
    Ok(relationships)
}

pub fn relationship_type_str(relationship_type: RelationshipType) -> &'static str {
    match relationship_type {
        RelationshipType::DependsOn => "DEPENDS_ON",
        RelationshipType::Implements => "IMPLEMENTS",
        RelationshipType::Uses => "USES",
        RelationshipType::References => "REFERENCES",
        RelationshipType::Causes => "CAUSES",
        RelationshipType::Blocks => "BLOCKS",
        RelationshipType::RelatedTo => "RELATED_TO",
        RelationshipType::DerivedFrom => "DERIVED_FROM",
    }
}

pub(crate) fn relationship_type_from_str(text: &str) -> RelationshipType {
    match text {
        "DEPENDS_ON" => RelationshipType::DependsOn,
        "IMPLEMENTS" => RelationshipType::Implements,
        "USES" => RelationshipType::Uses,
        "REFERENCES" => RelationshipType::References,
        "CAUSES" => RelationshipType::Causes,
        "BLOCKS" => RelationshipType::Blocks,
        "DERIVED_FROM" => RelationshipType::DerivedFrom,
        _ => RelationshipType::RelatedTo,
    }
}

fn parse_timestamp(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    text.parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "timestamp".into(), rusqlite::types::Type::Text))
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphRelationship> {
    let relationship_id_text: String = row.get("relationship_id")?;
    let relationship_id: RelationshipId = relationship_id_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "relationship_id".into(), rusqlite::types::Type::Text))?;
    let source_id_text: String = row.get("source_id")?;
    let source_id: EntityId = source_id_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "source_id".into(), rusqlite::types::Type::Text))?;
    let target_id_text: String = row.get("target_id")?;
    let target_id: EntityId = target_id_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "target_id".into(), rusqlite::types::Type::Text))?;
    let relationship_type_text: String = row.get("relationship_type")?;
    let properties_text: String = row.get("properties")?;

    Ok(GraphRelationship {
        id: relationship_id,
        relationship_type: relationship_type_from_str(&relationship_type_text),
        source_id,
        target_id,
        properties: serde_json::from_str(&properties_text).unwrap_or_default(),
        weight: row.get("weight")?,
        created_at: parse_timestamp(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_timestamp(&row.get::<_, String>("updated_at")?)?,
        event_time: parse_timestamp(&row.get::<_, String>("event_time")?)?,
        ingestion_time: parse_timestamp(&row.get::<_, String>("ingestion_time")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphDatabase;

    fn sample(
        relationship_id: RelationshipId,
        version: i64,
        source_id: EntityId,
        target_id: EntityId,
        relationship_type: RelationshipType,
        valid_from: DateTime<Utc>,
    ) -> NewVersion<'static> {
        let properties: &'static BTreeMap<String, serde_json::Value> =
            Box::leak(Box::new(BTreeMap::new()));
        NewVersion {
            relationship_id,
            version,
            relationship_type,
            source_id,
            target_id,
            weight: 1.0,
            properties,
            created_at: valid_from,
            updated_at: valid_from,
            event_time: valid_from,
            ingestion_time: valid_from,
            valid_from,
        }
    }

    #[test]
    fn insert_and_find_by_entity_both_directions() {
        let db = GraphDatabase::open_in_memory().unwrap();
        let a = EntityId::new();
        let b = EntityId::new();
        let rel_id = RelationshipId::new();
        insert_version(
            &db.conn,
            &sample(rel_id, 1, a, b, RelationshipType::DependsOn, Utc::now()),
        )
        .unwrap();

        assert_eq!(find_by_entity(&db.conn, &a).unwrap().len(), 1);
        assert_eq!(find_by_entity(&db.conn, &b).unwrap().len(), 1);
    }

    #[test]
    fn derived_from_lookup_is_directional() {
        let db = GraphDatabase::open_in_memory().unwrap();
        let child = EntityId::new();
        let parent = EntityId::new();
        insert_version(
            &db.conn,
            &sample(RelationshipId::new(), 1, child, parent, RelationshipType::DerivedFrom, Utc::now()),
        )
        .unwrap();

        assert_eq!(find_derived_from_by_source(&db.conn, &child).unwrap().len(), 1);
        assert_eq!(find_derived_from_by_target(&db.conn, &child).unwrap().len(), 0);
        assert_eq!(find_derived_from_by_target(&db.conn, &parent).unwrap().len(), 1);
    }
}
