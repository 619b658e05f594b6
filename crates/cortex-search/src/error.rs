use std::fmt;

use cortex_types::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    DimensionMismatch { expected: usize, actual: usize },
    InvalidArgument(String),
}

impl Error {
    pub const fn kind(&self) -> Kind {
        match self {
            Error::DimensionMismatch { .. } => Kind::InvalidArgument,
            Error::InvalidArgument(_) => Kind::InvalidArgument,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DimensionMismatch { expected, actual } => write!(
                f,
                "embedding dimension mismatch: expected {}, got {}",
                expected, actual
            ),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
