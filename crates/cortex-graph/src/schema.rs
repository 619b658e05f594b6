//! Schema for the bi-temporal entity/relationship graph (spec §4.5, §4.6).
//!
//! Both tables are version-append-only: a write never updates a row in
//! place, it inserts a new `(id, version)` row and, if one exists, sets the
//! previous current row's `valid_to`. "Current" means `valid_to IS NULL`.

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current != 0 && current != SCHEMA_VERSION {
        conn.execute_batch(
            "DROP TABLE IF EXISTS relationships; DROP TABLE IF EXISTS entities;",
        )?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            entity_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            entity_type TEXT NOT NULL,
            name TEXT NOT NULL,
            properties TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            event_time TEXT NOT NULL,
            ingestion_time TEXT NOT NULL,
            valid_from TEXT NOT NULL,
            valid_to TEXT,
            PRIMARY KEY (entity_id, version)
        );
        CREATE INDEX IF NOT EXISTS idx_entities_current ON entities(entity_id) WHERE valid_to IS NULL;
        CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type) WHERE valid_to IS NULL;

        CREATE TABLE IF NOT EXISTS relationships (
            relationship_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            relationship_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            weight REAL NOT NULL,
            properties TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            event_time TEXT NOT NULL,
            ingestion_time TEXT NOT NULL,
            valid_from TEXT NOT NULL,
            valid_to TEXT,
            PRIMARY KEY (relationship_id, version)
        );
        CREATE INDEX IF NOT EXISTS idx_relationships_current ON relationships(relationship_id) WHERE valid_to IS NULL;
        CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id) WHERE valid_to IS NULL;
        CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id) WHERE valid_to IS NULL;
        CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(relationship_type) WHERE valid_to IS NULL;
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
