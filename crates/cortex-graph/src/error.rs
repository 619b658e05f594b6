use std::fmt;

use cortex_types::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Database(rusqlite::Error),
    Json(serde_json::Error),
    Canonicalization(String),
    InvalidArgument(String),
    EntityNotFound(String),
    RelationshipNotFound(String),
    LineagePathNotFound { from: String, to: String },
    LineageEntityNotFound(String),
    CycleRejected(String),
    EvolutionNotFound(String),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::Database(_) => Kind::StorageError,
            Error::Json(_) => Kind::StorageError,
            Error::Canonicalization(_) => Kind::InvalidArgument,
            Error::InvalidArgument(_) => Kind::InvalidArgument,
            Error::EntityNotFound(_) => Kind::NotFound,
            Error::RelationshipNotFound(_) => Kind::NotFound,
            Error::LineagePathNotFound { .. } => Kind::NotFound,
            Error::LineageEntityNotFound(_) => Kind::NotFound,
            Error::CycleRejected(_) => Kind::InvalidArgument,
            Error::EvolutionNotFound(_) => Kind::NotFound,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "database error: {}", err),
            Error::Json(err) => write!(f, "{}", err),
            Error::Canonicalization(msg) => write!(f, "canonical JSON error: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::EntityNotFound(id) => write!(f, "entity not found: {}", id),
            Error::RelationshipNotFound(id) => write!(f, "relationship not found: {}", id),
            Error::LineagePathNotFound { from, to } => {
                write!(f, "no lineage path from {} to {}", from, to)
            }
            Error::LineageEntityNotFound(id) => write!(f, "lineage center entity not found: {}", id),
            Error::CycleRejected(msg) => write!(f, "rejected cycle in DERIVED_FROM graph: {}", msg),
            Error::EvolutionNotFound(id) => write!(f, "no evolution history for entity: {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<cortex_types::Error> for Error {
    fn from(err: cortex_types::Error) -> Self {
        Error::Canonicalization(err.to_string())
    }
}
