use std::fmt;

use cortex_types::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Query(String),
    MemoryKeyExists(String),
    MemoryKeyNotFound(String),
    SessionNotFound(String),
    InvalidSession(String),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::Database(_) => Kind::StorageError,
            Error::Io(_) => Kind::StorageError,
            Error::Json(_) => Kind::StorageError,
            Error::Query(_) => Kind::StorageError,
            Error::MemoryKeyExists(_) => Kind::AlreadyExists,
            Error::MemoryKeyNotFound(_) => Kind::NotFound,
            Error::SessionNotFound(_) => Kind::NotFound,
            Error::InvalidSession(_) => Kind::InvalidSession,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "database error: {}", err),
            Error::Io(err) => write!(f, "{}", err),
            Error::Json(err) => write!(f, "{}", err),
            Error::Query(msg) => write!(f, "{}", msg),
            Error::MemoryKeyExists(key) => write!(f, "memory key already exists: {}", key),
            Error::MemoryKeyNotFound(key) => write!(f, "memory key not found: {}", key),
            Error::SessionNotFound(id) => write!(f, "session not found: {}", id),
            Error::InvalidSession(msg) => write!(f, "invalid session: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Io(err) => Some(err),
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

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
