//! Parameterized queries over the versioned `entities` table (spec §4.5, §4.6).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cortex_types::domain::{EntityType, EntityVersion, GraphEntity, VersionInfo};
use cortex_types::EntityId;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

pub struct NewVersion<'a> {
    pub entity_id: EntityId,
    pub version: i64,
    pub entity_type: EntityType,
    pub name: &'a str,
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
        "INSERT INTO entities (entity_id, version, entity_type, name, properties, created_at,
            updated_at, event_time, ingestion_time, valid_from, valid_to)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)",
        params![
            new.entity_id.to_string(),
            new.version,
            entity_type_str(new.entity_type),
            new.name,
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

/// Sets the current row's `valid_to`, closing it out (spec §4.6: "sets the
/// previous current row's validTo = now"). Returns the number of rows
/// closed (0 or 1).
pub fn expire_current(conn: &Connection, entity_id: &EntityId, valid_to: DateTime<Utc>) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE entities SET valid_to = ?2 WHERE entity_id = ?1 AND valid_to IS NULL",
        params![entity_id.to_string(), valid_to.to_rfc3339()],
    )?;
    Ok(affected)
}

pub fn max_version(conn: &Connection, entity_id: &EntityId) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT max(version) FROM entities WHERE entity_id = ?1",
        params![entity_id.to_string()],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn get_current(conn: &Connection, entity_id: &EntityId) -> Result<Option<GraphEntity>> {
    conn.query_row(
        "SELECT entity_id, version, entity_type, name, properties, created_at, updated_at,
            event_time, ingestion_time, valid_from, valid_to
         FROM entities WHERE entity_id = ?1 AND valid_to IS NULL",
        params![entity_id.to_string()],
        row_to_entity,
    )
    .optional()
    .map_err(Into::into)
}

pub fn get_at_time(conn: &Connection, entity_id: &EntityId, at: DateTime<Utc>) -> Result<Option<EntityVersion>> {
    conn.query_row(
        "SELECT entity_id, version, entity_type, name, properties, created_at, updated_at,
            event_time, ingestion_time, valid_from, valid_to
         FROM entities
         WHERE entity_id = ?1 AND valid_from <= ?2 AND (valid_to IS NULL OR valid_to > ?2)",
        params![entity_id.to_string(), at.to_rfc3339()],
        row_to_entity_version,
    )
    .optional()
    .map_err(Into::into)
}

/// All versions newest-first (spec §4.6 `getEntityHistory`).
pub fn get_history(conn: &Connection, entity_id: &EntityId) -> Result<Vec<EntityVersion>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, version, entity_type, name, properties, created_at, updated_at,
            event_time, ingestion_time, valid_from, valid_to
         FROM entities WHERE entity_id = ?1 ORDER BY version DESC",
    )?;
    let rows = stmt.query_map(params![entity_id.to_string()], row_to_entity_version)?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

pub fn delete_all_versions(conn: &Connection, entity_id: &EntityId) -> Result<()> {
    conn.execute(
        "DELETE FROM entities WHERE entity_id = ?1",
        params![entity_id.to_string()],
    )?;
    Ok(())
}

pub fn find_by_type(conn: &Connection, entity_type: EntityType) -> Result<Vec<GraphEntity>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, version, entity_type, name, properties, created_at, updated_at,
            event_time, ingestion_time, valid_from, valid_to
         FROM entities WHERE entity_type = ?1 AND valid_to IS NULL ORDER BY entity_id ASC",
    )?;
    let rows = stmt.query_map(params![entity_type_str(entity_type)], row_to_entity)?;
    let mut entities = Vec::new();
    for row in rows {
        entities.push(row?);
    }
    Ok(entities)
}

pub fn exists_current(conn: &Connection, entity_id: &EntityId) -> Result<bool> {
    Ok(get_current(conn, entity_id)?.is_some())
}

pub(crate) fn entity_type_str(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Person => "person",
        EntityType::Organization => "organization",
        EntityType::CodeFile => "code_file",
        EntityType::CodeFunction => "code_function",
        EntityType::CodeClass => "code_class",
        EntityType::Decision => "decision",
        EntityType::Task => "task",
        EntityType::Error => "error",
        EntityType::Concept => "concept",
        EntityType::Event => "event",
    }
}

pub(crate) fn entity_type_from_str(text: &str) -> EntityType {
    match text {
        "person" => EntityType::Person,
        "organization" => EntityType::Organization,
        "code_file" => EntityType::CodeFile,
        "code_function" => EntityType::CodeFunction,
        "code_class" => EntityType::CodeClass,
        "decision" => EntityType::Decision,
        "task" => EntityType::Task,
        "error" => EntityType::Error,
        "concept" => EntityType::Concept,
        _ => EntityType::Event,
    }
}

fn parse_timestamp(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    text.parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "timestamp".into(), rusqlite::types::Type::Text))
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphEntity> {
    let entity_id_text: String = row.get("entity_id")?;
    let entity_id: EntityId = entity_id_text
        .parse()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "entity_id".into(), rusqlite::types::Type::Text))?;
    let entity_type_text: String = row.get("entity_type")?;
    let properties_text: String = row.get("properties")?;
    let properties = serde_json::from_str(&properties_text).unwrap_or_default();
    let version: i64 = row.get("version")?;
    let valid_from: String = row.get("valid_from")?;
    let valid_to: Option<String> = row.get("valid_to")?;

    Ok(GraphEntity {
        id: entity_id,
        entity_type: entity_type_from_str(&entity_type_text),
        name: row.get("name")?,
        properties,
        created_at: parse_timestamp(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_timestamp(&row.get::<_, String>("updated_at")?)?,
        event_time: parse_timestamp(&row.get::<_, String>("event_time")?)?,
        ingestion_time: parse_timestamp(&row.get::<_, String>("ingestion_time")?)?,
        version_info: Some(VersionInfo {
            valid_from: parse_timestamp(&valid_from)?,
            valid_to: valid_to.as_deref().map(parse_timestamp).transpose()?,
            version: version as u32,
        }),
    })
}

fn row_to_entity_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityVersion> {
    let entity = row_to_entity(row)?;
    let version_info = entity.version_info.clone().expect("row_to_entity always sets version_info");
    Ok(EntityVersion {
        entity_id: entity.id,
        version: version_info.version,
        entity,
        valid_from: version_info.valid_from,
        valid_to: version_info.valid_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GraphDatabase;

    fn sample(entity_id: EntityId, version: i64, valid_from: DateTime<Utc>) -> NewVersion<'static> {
        let properties: &'static BTreeMap<String, serde_json::Value> =
            Box::leak(Box::new(BTreeMap::new()));
        NewVersion {
            entity_id,
            version,
            entity_type: EntityType::CodeFile,
            name: "main.rs",
            properties,
            created_at: valid_from,
            updated_at: valid_from,
            event_time: valid_from,
            ingestion_time: valid_from,
            valid_from,
        }
    }

    #[test]
    fn insert_and_get_current_round_trips() {
        let db = GraphDatabase::open_in_memory().unwrap();
        let entity_id = EntityId::new();
        let now = Utc::now();
        insert_version(&db.conn, &sample(entity_id, 1, now)).unwrap();

        let current = get_current(&db.conn, &entity_id).unwrap().unwrap();
        assert_eq!(current.name, "main.rs");
        assert_eq!(current.version_info.unwrap().version, 1);
    }

    #[test]
    fn expire_then_insert_produces_two_versions() {
        let db = GraphDatabase::open_in_memory().unwrap();
        let entity_id = EntityId::new();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);

        insert_version(&db.conn, &sample(entity_id, 1, t1)).unwrap();
        expire_current(&db.conn, &entity_id, t2).unwrap();
        insert_version(&db.conn, &sample(entity_id, 2, t2)).unwrap();

        let history = get_history(&db.conn, &entity_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 2);
        assert!(history[0].valid_to.is_none());
        assert_eq!(history[1].valid_to, Some(t2));
    }
}
