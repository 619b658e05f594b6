use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::schema;

/// Owns the single SQLite connection backing the graph (spec §5: "the Graph
/// Manager uses the underlying graph store's transaction per write").
pub struct GraphDatabase {
    pub(crate) conn: Connection,
}

impl GraphDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_initializes_schema() {
        let db = GraphDatabase::open_in_memory().unwrap();
        let count: i64 = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='entities'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
