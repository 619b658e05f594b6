use std::fmt;

/// Result type alias used throughout the core types crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification shared by every crate's `Error` type so the dispatch layer
/// can map any failure to an HTTP/JSON-RPC status without per-crate glue.
///
/// Mirrors the error Kinds enumerated for the service as a whole: `NotFound`,
/// `AlreadyExists`, `InvalidArgument`, `InvalidSession`, `Unauthorized`,
/// `ServiceUnavailable`, `ProviderError`, `StorageError`, `ConsistencyError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    InvalidSession,
    Unauthorized,
    ServiceUnavailable,
    ProviderError,
    StorageError,
    ConsistencyError,
}

impl Kind {
    /// The name used on the wire in `{error: <Kind>, message: <text>}`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::NotFound => "NotFound",
            Kind::AlreadyExists => "AlreadyExists",
            Kind::InvalidArgument => "InvalidArgument",
            Kind::InvalidSession => "InvalidSession",
            Kind::Unauthorized => "Unauthorized",
            Kind::ServiceUnavailable => "ServiceUnavailable",
            Kind::ProviderError => "ProviderError",
            Kind::StorageError => "StorageError",
            Kind::ConsistencyError => "ConsistencyError",
        }
    }

    /// HTTP status conventionally associated with this kind.
    pub const fn http_status(self) -> u16 {
        match self {
            Kind::NotFound => 404,
            Kind::AlreadyExists => 409,
            Kind::InvalidArgument => 400,
            Kind::InvalidSession => 400,
            Kind::Unauthorized => 401,
            Kind::ServiceUnavailable => 503,
            Kind::ProviderError => 502,
            Kind::StorageError => 500,
            Kind::ConsistencyError => 500,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for the core types crate: canonicalization, hashing, and
/// configuration parsing.
#[derive(Debug)]
pub enum Error {
    /// A value failed canonical-JSON serialization.
    Canonicalization(String),
    /// A validation error on pure construction (never on hashing itself).
    InvalidArgument(String),
    /// Configuration file could not be read.
    Io(std::io::Error),
    /// Configuration file was not valid TOML.
    Toml(toml::de::Error),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::Canonicalization(_) => Kind::InvalidArgument,
            Error::InvalidArgument(_) => Kind::InvalidArgument,
            Error::Io(_) => Kind::StorageError,
            Error::Toml(_) => Kind::InvalidArgument,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Canonicalization(msg) => write!(f, "canonical JSON error: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Io(err) => write!(f, "{}", err),
            Error::Toml(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Toml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}
