use std::fmt;

use cortex_types::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Database(rusqlite::Error),
    Json(serde_json::Error),
    Canonicalization(String),
    InvalidArgument(String),
    NotFound(String),
    ProviderError(String),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::Database(_) => Kind::StorageError,
            Error::Json(_) => Kind::StorageError,
            Error::Canonicalization(_) => Kind::InvalidArgument,
            Error::InvalidArgument(_) => Kind::InvalidArgument,
            Error::NotFound(_) => Kind::NotFound,
            Error::ProviderError(_) => Kind::ProviderError,
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
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::ProviderError(msg) => write!(f, "provider error: {}", msg),
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
