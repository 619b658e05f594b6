use std::fmt;

use cortex_types::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Regex(regex::Error),
    InvalidArgument(String),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::Regex(_) => Kind::StorageError,
            Error::InvalidArgument(_) => Kind::InvalidArgument,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Regex(err) => write!(f, "pattern registry error: {}", err),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Regex(err) => Some(err),
            Error::InvalidArgument(_) => None,
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Regex(err)
    }
}
